//! Minijinja environment with the HTML templates compiled into the binary.

use minijinja::Environment;

const TEMPLATES: &[(&str, &str)] = &[
    ("index.html", include_str!("../templates/index.html")),
    ("form_post.html", include_str!("../templates/form_post.html")),
];

/// Build the template environment. `version` is available to every template.
pub fn build_env(version: String) -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_global("version", version);
    for (name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}
