use anyhow::Result;
use std::sync::{Arc, Barrier};
use std::thread;

use murmur_server::db::repositories::{AccountRepository, LikeRepository, PostRepository};
use murmur_server::db::{Database, ErrorKind, Schema};
use murmur_types::{NewAccount, NewLike, NewPost};

fn file_database(dir: &tempfile::TempDir) -> Result<Database> {
    let db = Database::new(dir.path().join("murmur.db"), Schema::social())?;
    db.initialize()?;
    Ok(db)
}

fn account(username: &str) -> NewAccount {
    NewAccount {
        name: username.to_string(),
        username: username.to_string(),
        password: "hash".to_string(),
        email: format!("{}@example.com", username),
        bio: None,
        avatar_url: None,
        is_private: None,
    }
}

#[test]
fn test_concurrent_duplicate_likes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = file_database(&dir)?;

    let author = AccountRepository::new(db.clone()).create(&account("author"))?;
    let post = PostRepository::new(db.clone()).create(&NewPost {
        user_id: author.id,
        content: "race".to_string(),
        media_urls: None,
        is_public: None,
        allow_comments: None,
    })?;

    const WRITERS: usize = 4;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let likes = LikeRepository::new(db.clone());
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                likes.create(&NewLike {
                    user_id: author.id,
                    post_id: Some(post.id),
                })
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer panicked"))
        .collect();

    let committed = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(conflicts, WRITERS - 1);
    assert_eq!(LikeRepository::new(db).count_for_post(&post.id)?, 1);
    Ok(())
}

#[test]
fn test_concurrent_delete_and_like_leave_no_orphans() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = file_database(&dir)?;

    let accounts = AccountRepository::new(db.clone());
    let author = accounts.create(&account("author"))?;
    let fan = accounts.create(&account("fan"))?;
    let post = PostRepository::new(db.clone()).create(&NewPost {
        user_id: author.id,
        content: "going away".to_string(),
        media_urls: None,
        is_public: None,
        allow_comments: None,
    })?;

    let barrier = Arc::new(Barrier::new(2));
    let deleter = {
        let accounts = AccountRepository::new(db.clone());
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            accounts.delete(&author.id)
        })
    };
    let liker = {
        let likes = LikeRepository::new(db.clone());
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            likes.create(&NewLike {
                user_id: fan.id,
                post_id: Some(post.id),
            })
        })
    };

    deleter.join().expect("deleter panicked")?;
    match liker.join().expect("liker panicked") {
        Ok(_) => {}
        Err(e) => assert_eq!(e.kind(), ErrorKind::Reference),
    }

    let conn = db.connection()?;
    let orphans: i64 = conn.query_row(
        "SELECT COUNT(*) FROM likes l LEFT JOIN posts p ON p.id = l.post_id WHERE p.id IS NULL",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(orphans, 0);
    assert_eq!(LikeRepository::new(db).count()?, 0);
    Ok(())
}
