use std::future::Future;
use std::path::{Path, PathBuf};

use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool, Transaction};

use log::{error, info};

use crate::feedback::Feedback;
use crate::user::{RegisterForm, User};

type Result<T> = std::result::Result<T, ()>;

#[derive(Debug)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug)]
pub enum CreateError {
    /// A UNIQUE constraint (username or email) was hit.
    Conflict,
    Internal,
}

#[derive(Debug)]
pub struct Backend(pub Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("feedback.sql")
}

pub async fn init(data_dir: &Path) {
    let final_path = format!(
        "sqlite://{}",
        into_sql(data_dir).to_str().expect("non utf-8 data")
    );
    match Sqlite::create_database(&final_path).await {
        Ok(()) => {
            info!("Using {}", &final_path);
        }
        Err(e) => {
            let sqlx::Error::Database(db_err) = e else {
                panic!("error creating database: {e}");
            };

            panic!("sql db error: {db_err:?}");
        }
    }
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        let db_pathbuf = into_sql(data_dir);
        let db_path = db_pathbuf.to_str().expect("non utf-8 data");
        let pool = match SqlitePool::connect(db_path).await {
            Ok(pool) => pool,
            Err(_err) => {
                init(data_dir).await;
                SqlitePool::connect(db_path).await.expect("db connection")
            }
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migration");

        Self(pool)
    }
}

impl Backend {
    async fn transact<'t, T, R, F>(&self, transaction: T) -> Result<R>
    where
        T: FnOnce(Transaction<'t, Sqlite>) -> F,
        F: Future<Output = Result<(Transaction<'t, Sqlite>, R)>>,
    {
        let tx = self.0.begin().await.map_err(|e| {
            error!("error beginning transaction: {:?}", e);
        })?;

        let (tx, r) = transaction(tx).await?;

        tx.commit().await.map_err(|e| {
            error!("error committing transaction: {:?}", e);
        })?;

        Ok(r)
    }
}

fn unique_violation(e: &sqlx::Error) -> bool {
    // sqlite extended codes: 2067 = UNIQUE, 1555 = UNIQUE on the rowid/pk
    match e {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("2067") | Some("1555"))
        }
        _ => false,
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> std::result::Result<User, FindError> {
        sqlx::query_as::<_, User>(
            "
            SELECT *
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if matches!(e, sqlx::Error::RowNotFound) {
                FindError::NotFound
            } else {
                error!("couldn't query user {username}: {e:?}");
                FindError::Internal
            }
        })
    }

    pub async fn create_user(
        &self,
        form: &RegisterForm,
        pwhash: &str,
    ) -> std::result::Result<User, CreateError> {
        sqlx::query(
            "
            INSERT INTO users
            (username, password, email, first_name, last_name)
            VALUES
            (?, ?, ?, ?, ?)
            ",
        )
        .bind(&form.username)
        .bind(pwhash)
        .bind(&form.email)
        .bind(&form.first_name)
        .bind(&form.last_name)
        .execute(&self.0)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                CreateError::Conflict
            } else {
                error!("couldn't insert user {}: {e:?}", form.username);
                CreateError::Internal
            }
        })?;

        self.find_user(&form.username).await.map_err(|e| {
            error!("couldn't re-read created user {}: {e:?}", form.username);
            CreateError::Internal
        })
    }

    /// session_id: set to None to logout / make NULL
    pub async fn update_user(&self, username: &str, session_id: Option<&str>) -> bool {
        sqlx::query(
            "
            UPDATE users
            SET session_id = ?
            WHERE username = ?
            ",
        )
        .bind(session_id)
        .bind(username)
        .execute(&self.0)
        .await
        .map_err(|e| {
            error!("update user: {e}");
            e
        })
        .is_ok()
    }

    pub async fn users_with_session(&self, session_id: &str) -> Result<Vec<User>> {
        sqlx::query_as::<_, User>(
            "
            SELECT *
            FROM users
            WHERE session_id = ?
            ",
        )
        .bind(session_id)
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't query for session {session_id}: {e:?}");
        })
    }

    /// Removes the user and, in the same transaction, all their feedback.
    pub async fn delete_user(&self, username: &str) -> Result<()> {
        self.transact(|mut tx| async move {
            sqlx::query("DELETE FROM feedback WHERE username = ?")
                .bind(username)
                .execute(&mut tx)
                .await
                .map_err(|e| {
                    error!("error deleting feedback for {username}: {e:?}");
                })?;

            sqlx::query("DELETE FROM users WHERE username = ?")
                .bind(username)
                .execute(&mut tx)
                .await
                .map_err(|e| {
                    error!("error deleting user {username}: {e:?}");
                })?;

            Ok((tx, ()))
        })
        .await
    }
}

impl Backend {
    pub async fn feedbacks_for_user(&self, username: &str) -> Result<Vec<Feedback>> {
        sqlx::query_as::<_, Feedback>(
            "
            SELECT *
            FROM feedback
            WHERE username = ?
            ORDER BY id
            ",
        )
        .bind(username)
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("error selecting feedback for {username}: {e:?}");
        })
    }

    pub async fn find_feedback(&self, id: i64) -> std::result::Result<Feedback, FindError> {
        sqlx::query_as::<_, Feedback>(
            "
            SELECT *
            FROM feedback
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if matches!(e, sqlx::Error::RowNotFound) {
                FindError::NotFound
            } else {
                error!("couldn't query feedback {id}: {e:?}");
                FindError::Internal
            }
        })
    }

    pub async fn create_feedback(&self, username: &str, title: &str, content: &str) -> Result<()> {
        sqlx::query(
            "
            INSERT INTO feedback
            (title, content, username)
            VALUES
            (?, ?, ?)
            ",
        )
        .bind(title)
        .bind(content)
        .bind(username)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!("error inserting feedback for {username}: {e:?}");
        })
    }

    pub async fn update_feedback(&self, id: i64, title: &str, content: &str) -> Result<()> {
        sqlx::query(
            "
            UPDATE feedback
            SET title = ?, content = ?
            WHERE id = ?
            ",
        )
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!("error updating feedback {id}: {e:?}");
        })
    }

    pub async fn delete_feedback(&self, id: i64) -> Result<()> {
        sqlx::query(
            "
            DELETE FROM feedback
            WHERE id = ?
            ",
        )
        .bind(id)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!("error deleting feedback {id}: {e:?}");
        })
    }
}

#[cfg(test)]
pub mod test {
    use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

    pub async fn create_db() -> Pool<Sqlite> {
        // a single connection, so every query sees the same :memory: db
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&db).await.unwrap();

        db
    }
}
