//! Synthetic posts for demos and load testing.

use chrono::{DateTime, Utc};
use fake::faker::chrono::en::DateTimeBefore;
use fake::faker::internet::en::Username;
use fake::faker::lorem::en::{Paragraphs, Sentence};
use fake::Fake;

use super::PostManager;
use crate::db::models::Post;
use crate::error::AppError;

fn fake_post() -> Post {
    let title: String = Sentence(3..8).fake();
    let title = title.trim_end_matches('.').to_string();
    let paragraphs: Vec<String> = Paragraphs(2..5).fake();
    let author: String = Username().fake();
    let body = format!(
        "{}\n\nPosted by **{}**. Reach out at https://example.com/{}",
        paragraphs.join("\n\n"),
        author,
        author
    );
    let created_at: DateTime<Utc> = DateTimeBefore(Utc::now()).fake();

    let mut post = Post::new(title, None, &body);
    post.created_at = created_at;
    post.updated_at = created_at;
    post
}

impl PostManager {
    /// Insert `count` random posts, each rendered like an authored one.
    pub async fn generate_fake(&self, count: usize) -> Result<usize, AppError> {
        // ThreadRng is not Send, so build everything before the first await
        let posts: Vec<Post> = (0..count).map(|_| fake_post()).collect();
        for post in &posts {
            self.store.insert_post(post).await?;
        }
        tracing::info!(count, "Generated fake posts");
        Ok(posts.len())
    }
}
