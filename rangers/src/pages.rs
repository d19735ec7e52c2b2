//! Server-rendered pages, with templates compiled into the binary.

use minijinja::{Environment, Value};

use crate::errors::Error;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("signup.html", include_str!("../templates/signup.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("course.html", include_str!("../templates/course.html")),
];

/// Template environment shared by all page handlers.
///
/// Every template sees `login_path`, the guard's configured login page.
#[derive(Debug)]
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new(login_path: &str) -> Result<Self, Error> {
        let mut env = Environment::new();
        env.add_global("login_path", login_path.to_string());
        for (name, source) in TEMPLATES {
            env.add_template(name, source).map_err(|e| Error::Internal {
                operation: format!("compile template {name}: {e}"),
            })?;
        }
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String, Error> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|e| Error::Internal {
                operation: format!("render template {name}: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_all_templates_compile() {
        let pages = Pages::new("/login").unwrap();
        for (name, _) in TEMPLATES {
            assert!(pages.env.get_template(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn test_values_are_escaped() {
        let pages = Pages::new("/login").unwrap();
        let html = pages
            .render("dashboard.html", context! { username => "<script>x</script>", role => "student" })
            .unwrap();
        assert!(html.contains("Hello, &lt;script&gt;"));
        assert!(!html.contains("<script>x</script>"));
    }

    #[test]
    fn test_unknown_template_is_internal_error() {
        let pages = Pages::new("/login").unwrap();
        let err = pages.render("missing.html", context! {}).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_nav_links_to_configured_login_path() {
        let pages = Pages::new("/sign-in").unwrap();
        let html = pages.render("home.html", context! {}).unwrap();
        assert!(html.contains(r#"href="/sign-in""#));
        assert!(!html.contains(r#"href="/login""#));
    }
}
