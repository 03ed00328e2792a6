//! Minimal HTML for the auth pages.

use service::auth::AuthRoutes;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
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

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}\n</body></html>\n"
    )
}

fn credentials_form(action: &str, submit: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{action}\">\n\
         <label>Username <input type=\"text\" name=\"username\" required></label>\n\
         <label>Password <input type=\"password\" name=\"password\" required></label>\n\
         <button type=\"submit\">{submit}</button>\n\
         </form>",
        action = escape(action),
    )
}

pub fn login_page(routes: &AuthRoutes) -> String {
    let body = format!(
        "{}\n<p>No account? <a href=\"{}\">Register</a></p>",
        credentials_form(&routes.login_submit, "Log in"),
        escape(&routes.register),
    );
    page("Log in", &body)
}

pub fn register_page(routes: &AuthRoutes) -> String {
    let body = format!(
        "{}\n<p>Already registered? <a href=\"{}\">Log in</a></p>",
        credentials_form(&routes.register_submit, "Register"),
        escape(&routes.login),
    );
    page("Register", &body)
}

pub fn home_page(routes: &AuthRoutes, username: &str) -> String {
    let body = format!(
        "<p>Signed in as <strong>{}</strong>.</p>\n<p><a href=\"{}\">Log out</a></p>",
        escape(username),
        escape(&routes.logout),
    );
    page("Home", &body)
}
