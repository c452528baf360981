use std::sync::Arc;

use clap::Parser;
use log::info;
use serde::de::DeserializeOwned;
use warp::Filter;

mod app;
mod args;
mod auth;
mod backend;
mod feedback;
mod handlers;
mod render;
mod user;

use crate::app::FeedbackApp;
use crate::args::Args;
use crate::auth::SESSION_COOKIE;
use crate::backend::Backend;

const FORM_LIMIT: u64 = 16 * 1024;

fn form<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form())
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let args = Args::parse();
    let addr = args.addr().expect("couldn't parse listen address");

    let backend = Backend::new(args.data_dir()).await;
    let app = Arc::new(FeedbackApp::new(backend));

    let with_app = {
        let app = Arc::clone(&app);
        warp::any().map(move || Arc::clone(&app))
    };
    let with_secure = {
        let secure = args.secure();
        warp::any().map(move || secure)
    };
    let session = || warp::cookie::optional::<String>(SESSION_COOKIE);
    let flash = || warp::cookie::optional::<String>(handlers::FLASH_COOKIE);

    let home = warp::path::end().and(warp::get()).map(handlers::home);

    let register_form = warp::path!("register")
        .and(warp::get())
        .and(flash())
        .and_then(handlers::register_form);

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_app.clone())
        .and(with_secure.clone())
        .and(form())
        .and_then(handlers::register);

    let login_form = warp::path!("login")
        .and(warp::get())
        .and(flash())
        .and_then(handlers::login_form);

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_app.clone())
        .and(with_secure)
        .and(session())
        .and(form())
        .and_then(handlers::login);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(with_app.clone())
        .and(session())
        .and_then(handlers::logout);

    let feedback_add_form = warp::path!("users" / String / "feedback" / "add")
        .and(warp::get())
        .and(with_app.clone())
        .and(session())
        .and(flash())
        .and_then(handlers::feedback_add_form);

    let feedback_add = warp::path!("users" / String / "feedback" / "add")
        .and(warp::post())
        .and(with_app.clone())
        .and(session())
        .and(form())
        .and_then(handlers::feedback_add);

    let feedback_edit_form = warp::path!("feedback" / i64 / "edit")
        .and(warp::get())
        .and(with_app.clone())
        .and(session())
        .and(flash())
        .and_then(handlers::feedback_edit_form);

    let feedback_edit = warp::path!("feedback" / i64 / "edit")
        .and(warp::post())
        .and(with_app.clone())
        .and(session())
        .and(form())
        .and_then(handlers::feedback_edit);

    let feedback_delete = warp::path!("feedback" / i64 / "delete")
        .and(warp::post())
        .and(with_app.clone())
        .and(session())
        .and_then(handlers::feedback_delete);

    let user_delete = warp::path!("users" / String / "delete")
        .and(warp::post())
        .and(with_app.clone())
        .and(session())
        .and_then(handlers::user_delete);

    let show_user = warp::path!("users" / String)
        .and(warp::get())
        .and(with_app)
        .and(session())
        .and(flash())
        .and_then(handlers::show_user);

    let routes = home
        .or(register_form)
        .or(register)
        .or(login_form)
        .or(login)
        .or(logout)
        .or(feedback_add_form)
        .or(feedback_add)
        .or(feedback_edit_form)
        .or(feedback_edit)
        .or(feedback_delete)
        .or(user_delete)
        .or(show_user)
        .recover(handlers::recover)
        .with(warp::log("feedbackd"));

    info!("listening on http://{addr}");

    warp::serve(routes).run(addr).await;
}
