use std::{result, str::FromStr, sync::Arc};

use log::{debug, error, info, trace};
use warp::http;

use crate::auth::{self, SessionId};
use crate::backend::{Backend, CreateError, FindError};
use crate::feedback::{Feedback, FeedbackForm};
use crate::user::{LoginForm, RegisterForm, User};

#[derive(Debug)]
pub struct FeedbackApp(Backend);

/// Proof of a live session. `USER_MATCH` additionally proves the session
/// user is the owner of whatever resource is being acted on.
#[derive(Debug)]
pub struct Authed<const USER_MATCH: bool = false> {
    app: Arc<FeedbackApp>,
    session_id: SessionId,
    username: String,
}

#[derive(Copy, Clone, Debug)]
pub enum Error {
    Internal,
    Unauthorized,
    BadRequest,
    NotFound,
    Conflict,
}

pub type Result<T> = result::Result<T, Error>;

impl Into<http::StatusCode> for Error {
    fn into(self) -> http::StatusCode {
        match self {
            Self::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => http::StatusCode::UNAUTHORIZED,
            Self::BadRequest => http::StatusCode::BAD_REQUEST,
            Self::NotFound => http::StatusCode::NOT_FOUND,
            Self::Conflict => http::StatusCode::CONFLICT,
        }
    }
}

impl warp::reject::Reject for Error {}

impl FeedbackApp {
    pub fn new(backend: Backend) -> Self {
        Self(backend)
    }

    pub async fn register(self: &Arc<Self>, form: &RegisterForm) -> Result<Authed<true>> {
        let username = &form.username;

        let pwhash = auth::hash_password(&form.password).map_err(|e| {
            error!("couldn't hash password for {username}: {e}");
            Error::Internal
        })?;

        let user = self.0.create_user(form, &pwhash).await.map_err(|e| match e {
            CreateError::Conflict => {
                info!("rejecting registration for {username}: username or email taken");
                Error::Conflict
            }
            CreateError::Internal => Error::Internal,
        })?;

        let session_id = SessionId::new();
        if !self
            .0
            .update_user(&user.username, Some(&session_id.to_string()))
            .await
        {
            error!("couldn't create session for new user {username}");
            return Err(Error::Internal);
        }

        info!("{username} registered, new session created");

        Ok(Authed {
            app: Arc::clone(self),
            session_id,
            username: user.username,
        })
    }

    pub async fn login(
        self: &Arc<Self>,
        credentials: &LoginForm,
        client_session_id: Option<SessionId>,
    ) -> Result<Authed<true>> {
        let username = &credentials.username;

        let user = self.0.find_user(username).await.map_err(|e| {
            if matches!(e, FindError::NotFound) {
                error!("rejecting non-existant user {}", username);
                Error::Unauthorized
            } else {
                error!("couldn't authenticate user {}: {e:?}", username);
                Error::Internal
            }
        })?;

        if !auth::verify_password(&credentials.password, &user.password) {
            error!("wrong password for user {}", username);
            return Err(Error::Unauthorized);
        }

        let ok = |session_id| {
            Ok(Authed {
                app: Arc::clone(self),
                session_id,
                username: user.username.clone(),
            })
        };

        let db_session_id = match user.session_id {
            Some(ref id) => {
                let session_id = SessionId::from_str(id).map_err(|()| {
                    error!("invalid stored session_id: {:?}", user.session_id);
                    Error::Internal
                })?;
                Some(session_id)
            }
            None => None,
        };

        match (client_session_id, db_session_id) {
            (Some(client), Some(db_id)) if client == db_id => {
                info!("{username} login: session check passed");
                ok(client)
            }
            (None, Some(db_id)) => {
                // logging in again, client's forgot their cookie
                info!("{username} login: fresh login");
                ok(db_id)
            }
            _ => {
                // initial login, or a stale client cookie
                let session_id = SessionId::new();

                if !self
                    .0
                    .update_user(username, Some(&session_id.to_string()))
                    .await
                {
                    error!("couldn't login user {}", username);
                    return Err(Error::Internal);
                }

                info!("{username} login: new session created");
                ok(session_id)
            }
        }
    }

    pub async fn authenticate(self: &Arc<Self>, session_id: SessionId) -> Result<Authed> {
        let session_str = session_id.to_string();

        let users = self
            .0
            .users_with_session(&session_str)
            .await
            .map_err(|()| Error::Internal)?;

        match &users[..] {
            [] => {
                error!("no user found for session {session_id}");
                Err(Error::Unauthorized)
            }
            [user] => {
                assert_eq!(user.session_id, Some(session_str));

                debug!("found user by session");
                Ok(Authed {
                    app: Arc::clone(self),
                    session_id,
                    username: user.username.clone(),
                })
            }
            _ => {
                error!("multiple users found for session {session_id}");
                Err(Error::Internal)
            }
        }
    }
}

impl<const USER_MATCH: bool> Authed<USER_MATCH> {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn logout(&self) -> Result<()> {
        let username = &self.username;
        info!("{username} logout");

        self.app
            .0
            .update_user(username, None)
            .await
            .then(|| ())
            .ok_or(Error::Internal)
    }
}

impl Authed {
    pub fn with_user(self, username: &str) -> Result<Authed<true>> {
        if username == self.username {
            Ok(Authed {
                app: self.app,
                session_id: self.session_id,
                username: self.username,
            })
        } else {
            error!(
                "mismatching session & username: session={{ username: {}, session_id: {} }}, username={username}",
                self.username,
                self.session_id,
            );
            Err(Error::Unauthorized)
        }
    }

    /// Loads an entry and proves the session user owns it.
    pub async fn with_feedback(self, id: i64) -> Result<(Authed<true>, Feedback)> {
        let feedback = self.app.0.find_feedback(id).await.map_err(|e| match e {
            FindError::NotFound => {
                error!("no feedback with id {id}");
                Error::NotFound
            }
            FindError::Internal => Error::Internal,
        })?;

        let authed = self.with_user(&feedback.username)?;
        Ok((authed, feedback))
    }

    pub async fn user_page(&self, username: &str) -> Result<(User, Vec<Feedback>)> {
        trace!("{} viewing {username}", self.username);

        let user = self.app.0.find_user(username).await.map_err(|e| match e {
            FindError::NotFound => Error::NotFound,
            FindError::Internal => Error::Internal,
        })?;

        let feedbacks = self
            .app
            .0
            .feedbacks_for_user(username)
            .await
            .map_err(|()| Error::Internal)?;

        Ok((user, feedbacks))
    }
}

impl Authed<true> {
    pub async fn add_feedback(&self, form: &FeedbackForm) -> Result<()> {
        let username = &self.username;
        trace!("{username} adding feedback");

        self.app
            .0
            .create_feedback(username, &form.title, &form.content)
            .await
            .map_err(|()| Error::Internal)?;

        info!("{username} added feedback: {}", form.title);
        Ok(())
    }

    pub async fn update_feedback(&self, feedback: &Feedback, form: &FeedbackForm) -> Result<()> {
        let username = &self.username;

        self.app
            .0
            .update_feedback(feedback.id, &form.title, &form.content)
            .await
            .map_err(|()| Error::Internal)?;

        info!("{username} updated feedback {}", feedback.id);
        Ok(())
    }

    pub async fn delete_feedback(&self, feedback: &Feedback) -> Result<()> {
        let username = &self.username;

        self.app
            .0
            .delete_feedback(feedback.id)
            .await
            .map_err(|()| Error::Internal)?;

        info!("{username} deleted feedback {}", feedback.id);
        Ok(())
    }

    pub async fn delete_account(self) -> Result<()> {
        let username = &self.username;
        info!("{username} deleting their account");

        self.app
            .0
            .delete_user(username)
            .await
            .map_err(|()| Error::Internal)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::backend;

    async fn create_app() -> Arc<FeedbackApp> {
        let db = backend::test::create_db().await;
        Arc::new(FeedbackApp(Backend(db)))
    }

    fn registration(username: &str, email: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            password: "hunter2hunter2".into(),
            email: email.into(),
            first_name: "Test".into(),
            last_name: "User".into(),
        }
    }

    fn credentials(username: &str, password: &str) -> LoginForm {
        LoginForm {
            username: username.into(),
            password: password.into(),
        }
    }

    fn entry(title: &str, content: &str) -> FeedbackForm {
        FeedbackForm {
            title: title.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let app = create_app().await;

        let authed = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        assert_eq!(authed.username(), "alice");

        // the session minted at registration is live:
        let session = *authed.session_id();
        let authed = app.authenticate(session).await.unwrap();
        assert_eq!(authed.username(), "alice");

        // logging in again without a cookie reuses the stored session:
        let authed = app
            .login(&credentials("alice", "hunter2hunter2"), None)
            .await
            .unwrap();
        assert_eq!(*authed.session_id(), session);
    }

    #[tokio::test]
    async fn wrong_password_rejected() {
        let app = create_app().await;
        app.register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = app
            .login(&credentials("alice", "wrong-password"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));

        let err = app
            .login(&credentials("nobody", "hunter2hunter2"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = create_app().await;
        app.register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();

        // same username:
        let err = app
            .register(&registration("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict));

        // same email:
        let err = app
            .register(&registration("alice2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict));
    }

    #[tokio::test]
    async fn stale_client_session_replaced() {
        let app = create_app().await;
        let registered = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let original = *registered.session_id();

        let stale = SessionId::new();
        let authed = app
            .login(&credentials("alice", "hunter2hunter2"), Some(stale))
            .await
            .unwrap();
        assert_ne!(*authed.session_id(), stale);
        assert_ne!(*authed.session_id(), original);

        // only the fresh session authenticates now
        assert!(app.authenticate(original).await.is_err());
        app.authenticate(*authed.session_id()).await.unwrap();
    }

    #[tokio::test]
    async fn logout_invalidates_session() {
        let app = create_app().await;
        let authed = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let session = *authed.session_id();

        app.authenticate(session).await.unwrap().logout().await.unwrap();

        let err = app.authenticate(session).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn feedback_crud_roundtrip() {
        let app = create_app().await;
        let owner = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let session = *owner.session_id();

        owner.add_feedback(&entry("first", "body")).await.unwrap();

        let viewer = app.authenticate(session).await.unwrap();
        let (user, feedbacks) = viewer.user_page("alice").await.unwrap();
        assert_eq!(user.username, "alice");
        let [ref fb] = feedbacks[..] else {
            panic!("expected single feedback")
        };
        assert_eq!((fb.title.as_str(), fb.content.as_str()), ("first", "body"));

        // edit:
        let (owner, fb) = app
            .authenticate(session)
            .await
            .unwrap()
            .with_feedback(fb.id)
            .await
            .unwrap();
        owner
            .update_feedback(&fb, &entry("edited", "new body"))
            .await
            .unwrap();

        let viewer = app.authenticate(session).await.unwrap();
        let (_, feedbacks) = viewer.user_page("alice").await.unwrap();
        let [ref fb] = feedbacks[..] else {
            panic!("expected single feedback")
        };
        assert_eq!(
            (fb.title.as_str(), fb.content.as_str()),
            ("edited", "new body")
        );

        // delete:
        let (owner, fb) = app
            .authenticate(session)
            .await
            .unwrap()
            .with_feedback(fb.id)
            .await
            .unwrap();
        owner.delete_feedback(&fb).await.unwrap();

        let viewer = app.authenticate(session).await.unwrap();
        let (_, feedbacks) = viewer.user_page("alice").await.unwrap();
        assert!(feedbacks.is_empty());
    }

    #[tokio::test]
    async fn foreign_feedback_rejected() {
        let app = create_app().await;
        let alice = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let bob = app
            .register(&registration("bob", "bob@example.com"))
            .await
            .unwrap();

        alice.add_feedback(&entry("hers", "private")).await.unwrap();

        let viewer = app.authenticate(*bob.session_id()).await.unwrap();
        let (_, feedbacks) = viewer.user_page("alice").await.unwrap();
        let [ref fb] = feedbacks[..] else {
            panic!("expected single feedback")
        };

        let bob_authed = app.authenticate(*bob.session_id()).await.unwrap();
        let err = bob_authed.with_feedback(fb.id).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn cross_account_deletion_rejected() {
        let app = create_app().await;
        app.register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let bob = app
            .register(&registration("bob", "bob@example.com"))
            .await
            .unwrap();

        let bob_authed = app.authenticate(*bob.session_id()).await.unwrap();
        let err = bob_authed.with_user("alice").unwrap_err();
        assert!(matches!(err, Error::Unauthorized));

        // alice is untouched
        let viewer = app.authenticate(*bob.session_id()).await.unwrap();
        viewer.user_page("alice").await.unwrap();
    }

    #[tokio::test]
    async fn deleting_user_deletes_feedback() {
        let app = create_app().await;
        let alice = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let session = *alice.session_id();

        alice.add_feedback(&entry("one", "body")).await.unwrap();
        alice.add_feedback(&entry("two", "body")).await.unwrap();

        let ids: Vec<_> = {
            let viewer = app.authenticate(session).await.unwrap();
            let (_, feedbacks) = viewer.user_page("alice").await.unwrap();
            feedbacks.iter().map(|fb| fb.id).collect()
        };
        assert_eq!(ids.len(), 2);

        let authed = app
            .authenticate(session)
            .await
            .unwrap()
            .with_user("alice")
            .unwrap();
        authed.delete_account().await.unwrap();

        // the session died with the account:
        assert!(app.authenticate(session).await.is_err());

        // and so did the feedback:
        assert!(matches!(
            app.0.find_user("alice").await,
            Err(FindError::NotFound)
        ));
        for id in ids {
            assert!(matches!(
                app.0.find_feedback(id).await,
                Err(FindError::NotFound)
            ));
        }
    }

    #[tokio::test]
    async fn viewing_missing_user_not_found() {
        let app = create_app().await;
        let alice = app
            .register(&registration("alice", "alice@example.com"))
            .await
            .unwrap();

        let viewer = app.authenticate(*alice.session_id()).await.unwrap();
        let err = viewer.user_page("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }
}
