use std::convert::Infallible;
use std::sync::Arc;

use base64_light::{base64_decode, base64_encode};
use cookie::Cookie;
use log::error;
use validator::Validate;
use warp::http::{header, HeaderValue, StatusCode};
use warp::{reply::Response, Rejection, Reply};

use crate::app::{self, Authed, FeedbackApp};
use crate::auth::{SessionId, SESSION_COOKIE};
use crate::feedback::FeedbackForm;
use crate::render;
use crate::user::{validation_messages, LoginForm, RegisterForm};

pub const FLASH_COOKIE: &str = "flash";

fn html(page: String) -> Response {
    warp::reply::html(page).into_response()
}

fn see_other(location: &str) -> Response {
    let reply = warp::reply::with_header(warp::reply(), header::LOCATION, location);
    warp::reply::with_status(reply, StatusCode::SEE_OTHER).into_response()
}

fn add_cookie(res: &mut Response, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            res.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => error!("unencodable cookie: {e}"),
    }
}

/// Flash payloads are base64ed so arbitrary text stays within
/// RFC 6265 cookie-octets.
fn flash_cookie(message: &str) -> Cookie<'static> {
    Cookie::build((FLASH_COOKIE, base64_encode(message)))
        .path("/")
        .http_only(true)
        .build()
}

fn clear_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(cookie::time::Duration::ZERO)
        .build()
}

fn session_cookie(session_id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .build()
}

fn redirect_with_flash(location: &str, message: &str) -> Response {
    let mut res = see_other(location);
    add_cookie(&mut res, &flash_cookie(message));
    res
}

fn take_flash(flash: Option<String>) -> Option<String> {
    let encoded = flash?;
    String::from_utf8(base64_decode(&encoded))
        .ok()
        .filter(|s| !s.is_empty())
}

/// Pages that displayed a flash also expire its cookie.
fn page_clearing_flash(markup: String, had_flash: bool) -> Response {
    let mut res = html(markup);
    if had_flash {
        add_cookie(&mut res, &clear_cookie(FLASH_COOKIE));
    }
    res
}

async fn authed(app: &Arc<FeedbackApp>, session: Option<String>) -> app::Result<Authed> {
    let session = session.ok_or(app::Error::Unauthorized)?;
    let session_id: SessionId = session.parse().map_err(|()| app::Error::Unauthorized)?;
    app.authenticate(session_id).await
}

fn parse_session(session: Option<String>) -> Option<SessionId> {
    session.and_then(|s| s.parse().ok())
}

pub fn home() -> Response {
    see_other("/register")
}

pub async fn show_user(
    username: String,
    app: Arc<FeedbackApp>,
    session: Option<String>,
    flash: Option<String>,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;

    match viewer.user_page(&username).await {
        Ok((user, feedbacks)) => {
            let flash = take_flash(flash);
            let page = render::user_page(&user, &feedbacks, viewer.username(), flash.as_deref());
            Ok(page_clearing_flash(page, flash.is_some()))
        }
        Err(app::Error::NotFound) => Ok(redirect_with_flash("/", "User not found.")),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn register_form(flash: Option<String>) -> Result<Response, Rejection> {
    let flash = take_flash(flash);
    let page = render::register_page(&RegisterForm::default(), &[], flash.as_deref());
    Ok(page_clearing_flash(page, flash.is_some()))
}

pub async fn register(
    app: Arc<FeedbackApp>,
    secure: bool,
    form: RegisterForm,
) -> Result<Response, Rejection> {
    if let Err(errors) = form.validate() {
        let messages = validation_messages(&errors);
        return Ok(html(render::register_page(&form, &messages, None)));
    }

    match app.register(&form).await {
        Ok(registered) => {
            let mut res = see_other(&format!("/users/{}", registered.username()));
            add_cookie(&mut res, &session_cookie(registered.session_id(), secure));
            add_cookie(
                &mut res,
                &flash_cookie("Welcome! You successfully made your account"),
            );
            Ok(res)
        }
        Err(app::Error::Conflict) => {
            let messages = ["Username or email already taken.".to_string()];
            Ok(html(render::register_page(&form, &messages, None)))
        }
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn login_form(flash: Option<String>) -> Result<Response, Rejection> {
    let flash = take_flash(flash);
    let page = render::login_page("", &[], flash.as_deref());
    Ok(page_clearing_flash(page, flash.is_some()))
}

pub async fn login(
    app: Arc<FeedbackApp>,
    secure: bool,
    session: Option<String>,
    form: LoginForm,
) -> Result<Response, Rejection> {
    if let Err(errors) = form.validate() {
        let messages = validation_messages(&errors);
        return Ok(html(render::login_page(&form.username, &messages, None)));
    }

    match app.login(&form, parse_session(session)).await {
        Ok(logged_in) => {
            let mut res = see_other(&format!("/users/{}", logged_in.username()));
            add_cookie(&mut res, &session_cookie(logged_in.session_id(), secure));
            add_cookie(
                &mut res,
                &flash_cookie(&format!("Welcome Back {}!", logged_in.username())),
            );
            Ok(res)
        }
        Err(app::Error::Unauthorized) => {
            let messages = ["Invalid username/password.".to_string()];
            Ok(html(render::login_page(&form.username, &messages, None)))
        }
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn logout(
    app: Arc<FeedbackApp>,
    session: Option<String>,
) -> Result<Response, Rejection> {
    match authed(&app, session).await {
        Ok(logged_in) => logged_in.logout().await.map_err(warp::reject::custom)?,
        // no live session to invalidate; still clear the cookie below
        Err(_) => (),
    }

    let mut res = redirect_with_flash("/", "Goodbye!");
    add_cookie(&mut res, &clear_cookie(SESSION_COOKIE));
    Ok(res)
}

pub async fn feedback_add_form(
    username: String,
    app: Arc<FeedbackApp>,
    session: Option<String>,
    flash: Option<String>,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;

    match viewer.with_user(&username) {
        Ok(_) => {
            let flash = take_flash(flash);
            let action = format!("/users/{username}/feedback/add");
            let page =
                render::feedback_page("Add feedback", &action, "", "", &[], flash.as_deref());
            Ok(page_clearing_flash(page, flash.is_some()))
        }
        Err(app::Error::Unauthorized) => Ok(redirect_with_flash(
            "/",
            "You can only add feedback for yourself.",
        )),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn feedback_add(
    username: String,
    app: Arc<FeedbackApp>,
    session: Option<String>,
    form: FeedbackForm,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;

    let owner = match viewer.with_user(&username) {
        Ok(owner) => owner,
        Err(app::Error::Unauthorized) => {
            return Ok(redirect_with_flash(
                "/",
                "You can only add feedback for yourself.",
            ))
        }
        Err(e) => return Err(warp::reject::custom(e)),
    };

    if let Err(errors) = form.validate() {
        let messages = validation_messages(&errors);
        let action = format!("/users/{username}/feedback/add");
        return Ok(html(render::feedback_page(
            "Add feedback",
            &action,
            &form.title,
            &form.content,
            &messages,
            None,
        )));
    }

    owner
        .add_feedback(&form)
        .await
        .map_err(warp::reject::custom)?;

    Ok(see_other(&format!("/users/{username}")))
}

pub async fn feedback_edit_form(
    id: i64,
    app: Arc<FeedbackApp>,
    session: Option<String>,
    flash: Option<String>,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;
    let viewer_name = viewer.username().to_string();

    match viewer.with_feedback(id).await {
        Ok((_, feedback)) => {
            let flash = take_flash(flash);
            let action = format!("/feedback/{id}/edit");
            let page = render::feedback_page(
                "Edit feedback",
                &action,
                &feedback.title,
                &feedback.content,
                &[],
                flash.as_deref(),
            );
            Ok(page_clearing_flash(page, flash.is_some()))
        }
        Err(app::Error::NotFound) => Ok(redirect_with_flash("/", "Feedback not found.")),
        Err(app::Error::Unauthorized) => Ok(redirect_with_flash(
            &format!("/users/{viewer_name}"),
            "You do not have permission to edit this feedback.",
        )),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn feedback_edit(
    id: i64,
    app: Arc<FeedbackApp>,
    session: Option<String>,
    form: FeedbackForm,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;
    let viewer_name = viewer.username().to_string();

    let (owner, feedback) = match viewer.with_feedback(id).await {
        Ok(found) => found,
        Err(app::Error::NotFound) => return Ok(redirect_with_flash("/", "Feedback not found.")),
        Err(app::Error::Unauthorized) => {
            return Ok(redirect_with_flash(
                &format!("/users/{viewer_name}"),
                "You do not have permission to edit this feedback.",
            ))
        }
        Err(e) => return Err(warp::reject::custom(e)),
    };

    if let Err(errors) = form.validate() {
        let messages = validation_messages(&errors);
        let action = format!("/feedback/{id}/edit");
        return Ok(html(render::feedback_page(
            "Edit feedback",
            &action,
            &form.title,
            &form.content,
            &messages,
            None,
        )));
    }

    owner
        .update_feedback(&feedback, &form)
        .await
        .map_err(warp::reject::custom)?;

    Ok(see_other(&format!("/users/{}", feedback.username)))
}

pub async fn feedback_delete(
    id: i64,
    app: Arc<FeedbackApp>,
    session: Option<String>,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;
    let viewer_name = viewer.username().to_string();

    match viewer.with_feedback(id).await {
        Ok((owner, feedback)) => {
            owner
                .delete_feedback(&feedback)
                .await
                .map_err(warp::reject::custom)?;

            Ok(redirect_with_flash(
                &format!("/users/{}", feedback.username),
                "Successfully deleted the feedback!",
            ))
        }
        Err(app::Error::NotFound) => Ok(redirect_with_flash("/", "Feedback not found.")),
        Err(app::Error::Unauthorized) => Ok(redirect_with_flash(
            &format!("/users/{viewer_name}"),
            "You do not have permission to delete this feedback.",
        )),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn user_delete(
    username: String,
    app: Arc<FeedbackApp>,
    session: Option<String>,
) -> Result<Response, Rejection> {
    let viewer = authed(&app, session).await.map_err(warp::reject::custom)?;
    let viewer_name = viewer.username().to_string();

    match viewer.with_user(&username) {
        Ok(owner) => {
            owner
                .delete_account()
                .await
                .map_err(warp::reject::custom)?;

            let mut res = redirect_with_flash("/", "Successfully deleted the user.");
            add_cookie(&mut res, &clear_cookie(SESSION_COOKIE));
            Ok(res)
        }
        Err(app::Error::Unauthorized) => Ok(redirect_with_flash(
            &format!("/users/{viewer_name}"),
            "You can only delete your own account.",
        )),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    let status: StatusCode = if let Some(&err) = rejection.find::<app::Error>() {
        match err {
            app::Error::Unauthorized => {
                return Ok(redirect_with_flash("/login", "Please login first!"))
            }
            app::Error::NotFound => return Ok(redirect_with_flash("/", "Not found.")),
            e => e.into(),
        }
    } else if rejection.is_not_found() {
        StatusCode::NOT_FOUND
    } else if rejection
        .find::<warp::body::BodyDeserializeError>()
        .is_some()
    {
        app::Error::BadRequest.into()
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        StatusCode::METHOD_NOT_ALLOWED
    } else {
        error!("unhandled rejection: {rejection:?}");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok(
        warp::reply::with_status(warp::reply::html(render::status_page(status)), status)
            .into_response(),
    )
}
