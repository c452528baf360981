//! Server-rendered pages. Every user-supplied value goes through
//! [`escape`] before it lands in markup, attributes included.

use warp::http::StatusCode;

use crate::feedback::Feedback;
use crate::user::{RegisterForm, User};

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, flash: Option<&str>, body: &str) -> String {
    let flash = match flash {
        Some(msg) => format!("<aside class=\"flash\">{}</aside>\n", escape(msg)),
        None => String::new(),
    };

    format!(
        "<!doctype html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{} - feedbackd</title>\n\
         </head>\n\
         <body>\n\
         {flash}{body}\n\
         </body>\n\
         </html>\n",
        escape(title),
    )
}

fn errors_block(errors: &[String]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    let items: String = errors
        .iter()
        .map(|e| format!("<li>{}</li>", escape(e)))
        .collect();

    format!("<ul class=\"errors\">{items}</ul>\n")
}

pub fn register_page(form: &RegisterForm, errors: &[String], flash: Option<&str>) -> String {
    let body = format!(
        "<h1>Register</h1>\n\
         {errors}\
         <form method=\"post\" action=\"/register\">\n\
         <label>Username <input name=\"username\" value=\"{username}\"></label>\n\
         <label>Password <input type=\"password\" name=\"password\"></label>\n\
         <label>Email <input name=\"email\" value=\"{email}\"></label>\n\
         <label>First name <input name=\"first_name\" value=\"{first_name}\"></label>\n\
         <label>Last name <input name=\"last_name\" value=\"{last_name}\"></label>\n\
         <button type=\"submit\">Register</button>\n\
         </form>\n\
         <p>Already have an account? <a href=\"/login\">Login</a></p>",
        errors = errors_block(errors),
        username = escape(&form.username),
        email = escape(&form.email),
        first_name = escape(&form.first_name),
        last_name = escape(&form.last_name),
    );

    layout("Register", flash, &body)
}

pub fn login_page(username: &str, errors: &[String], flash: Option<&str>) -> String {
    let body = format!(
        "<h1>Login</h1>\n\
         {errors}\
         <form method=\"post\" action=\"/login\">\n\
         <label>Username <input name=\"username\" value=\"{username}\"></label>\n\
         <label>Password <input type=\"password\" name=\"password\"></label>\n\
         <button type=\"submit\">Login</button>\n\
         </form>\n\
         <p>No account yet? <a href=\"/register\">Register</a></p>",
        errors = errors_block(errors),
        username = escape(username),
    );

    layout("Login", flash, &body)
}

/// Shared by the add and edit forms; they differ only in heading and
/// submit target.
pub fn feedback_page(
    heading: &str,
    action: &str,
    title: &str,
    content: &str,
    errors: &[String],
    flash: Option<&str>,
) -> String {
    let body = format!(
        "<h1>{heading}</h1>\n\
         {errors}\
         <form method=\"post\" action=\"{action}\">\n\
         <label>Title <input name=\"title\" value=\"{title}\"></label>\n\
         <label>Content <textarea name=\"content\">{content}</textarea></label>\n\
         <button type=\"submit\">Save</button>\n\
         </form>",
        heading = escape(heading),
        errors = errors_block(errors),
        action = escape(action),
        title = escape(title),
        content = escape(content),
    );

    layout(heading, flash, &body)
}

pub fn user_page(
    user: &User,
    feedbacks: &[Feedback],
    viewer: &str,
    flash: Option<&str>,
) -> String {
    let username = escape(&user.username);
    let is_owner = viewer == user.username;

    let mut body = format!(
        "<h1>{first} {last} (@{username})</h1>\n\
         <p>{email}</p>\n",
        first = escape(&user.first_name),
        last = escape(&user.last_name),
        email = escape(&user.email),
    );

    body.push_str("<h2>Feedback</h2>\n");
    for fb in feedbacks {
        body.push_str(&format!(
            "<article>\n\
             <h3>{title}</h3>\n\
             <p>{content}</p>\n",
            title = escape(&fb.title),
            content = escape(&fb.content),
        ));
        if is_owner {
            body.push_str(&format!(
                "<a href=\"/feedback/{id}/edit\">Edit</a>\n\
                 <form method=\"post\" action=\"/feedback/{id}/delete\">\n\
                 <button type=\"submit\">Delete</button>\n\
                 </form>\n",
                id = fb.id,
            ));
        }
        body.push_str("</article>\n");
    }

    if is_owner {
        body.push_str(&format!(
            "<p><a href=\"/users/{username}/feedback/add\">Add feedback</a></p>\n\
             <p><a href=\"/logout\">Logout</a></p>\n\
             <form method=\"post\" action=\"/users/{username}/delete\">\n\
             <button type=\"submit\">Delete account</button>\n\
             </form>",
        ));
    } else {
        body.push_str("<p><a href=\"/logout\">Logout</a></p>");
    }

    layout(&user.username, flash, &body)
}

pub fn status_page(status: StatusCode) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p><a href=\"/\">Home</a></p>",
        escape(&status.to_string()),
    );

    layout(status.canonical_reason().unwrap_or("Error"), None, &body)
}
