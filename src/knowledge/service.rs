use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use super::repo::{self, Knowledge, NewKnowledge};
use crate::{
    error::ApiError,
    state::AppState,
    users::User,
    xp::{XP_PER_COMMENT, XP_PER_KNOWLEDGE},
};

pub struct UploadItem {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Object keys keep uploads grouped per author and entry; the file id
/// prefix makes clashing upload names harmless.
fn object_key(author_id: Uuid, knowledge_id: Uuid, file_id: Uuid, file_name: &str) -> String {
    format!(
        "knowledge/{}/{}/{}-{}",
        author_id,
        knowledge_id,
        file_id,
        sanitize_file_name(file_name)
    )
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "file".into()
    } else {
        cleaned
    }
}

/// Creates a knowledge entry, uploads its attachments, records them in one
/// transaction, then awards the author's XP.
pub async fn create_with_files(
    st: &AppState,
    author: &User,
    fields: NewKnowledge,
    files: Vec<UploadItem>,
) -> Result<(Knowledge, Vec<Uuid>), ApiError> {
    let knowledge = repo::insert(&st.db, Uuid::new_v4(), author.id, &fields).await?;

    struct Stored {
        id: Uuid,
        file_name: String,
        key: String,
        content_type: String,
    }
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        let file_id = Uuid::new_v4();
        let key = object_key(author.id, knowledge.id, file_id, &file.file_name);
        st.storage
            .put_object(&key, file.body, &file.content_type)
            .await
            .with_context(|| format!("put_object {}", key))?;
        stored.push(Stored {
            id: file_id,
            file_name: file.file_name,
            key,
            content_type: file.content_type,
        });
    }

    let mut tx = st.db.begin().await.context("begin tx")?;
    for s in &stored {
        repo::insert_file_tx(&mut tx, s.id, knowledge.id, &s.file_name, &s.key, &s.content_type)
            .await?;
    }
    tx.commit().await.context("commit tx")?;

    st.xp.award(author.id, XP_PER_KNOWLEDGE).await?;

    Ok((knowledge, stored.into_iter().map(|s| s.id).collect()))
}

/// Author-only delete; attachments are removed from storage first, the row
/// cascade cleans up the rest.
pub async fn delete(st: &AppState, actor: &User, id: Uuid) -> Result<(), ApiError> {
    let author_id = repo::author_of(&st.db, id)
        .await?
        .ok_or(ApiError::NotFound("Knowledge"))?;
    if author_id != actor.id {
        return Err(ApiError::Forbidden(
            "Only the author can delete this knowledge",
        ));
    }

    for key in repo::file_keys(&st.db, id).await? {
        if let Err(e) = st.storage.delete_object(&key).await {
            warn!(error = %e, key, "attachment removal failed, continuing");
        }
    }
    repo::delete(&st.db, id).await?;
    Ok(())
}

pub async fn add_comment(
    st: &AppState,
    author: &User,
    knowledge_id: Uuid,
    content: &str,
) -> Result<(Uuid, time::OffsetDateTime), ApiError> {
    if !repo::exists(&st.db, knowledge_id).await? {
        return Err(ApiError::NotFound("Knowledge"));
    }
    let comment =
        repo::insert_comment(&st.db, Uuid::new_v4(), knowledge_id, author.id, content).await?;
    st.xp.award(author.id, XP_PER_COMMENT).await?;
    Ok(comment)
}

pub async fn add_collaborator(
    st: &AppState,
    actor: &User,
    knowledge_id: Uuid,
    user_id: Uuid,
) -> Result<(), ApiError> {
    let author_id = repo::author_of(&st.db, knowledge_id)
        .await?
        .ok_or(ApiError::NotFound("Knowledge"))?;
    if author_id != actor.id {
        return Err(ApiError::Forbidden(
            "Only the author can add collaborators",
        ));
    }
    if st.users.find_by_id(user_id).await?.is_none() {
        return Err(ApiError::NotFound("User"));
    }
    repo::add_collaborator(&st.db, knowledge_id, user_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized_for_object_keys() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("売上 2024.xlsx"), "___2024.xlsx");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("///"), "file");
    }

    #[test]
    fn object_keys_group_by_author_and_entry() {
        let author = Uuid::new_v4();
        let knowledge = Uuid::new_v4();
        let file = Uuid::new_v4();
        let key = object_key(author, knowledge, file, "notes.md");
        assert_eq!(
            key,
            format!("knowledge/{author}/{knowledge}/{file}-notes.md")
        );
    }
}
