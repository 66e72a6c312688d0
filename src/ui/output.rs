use crate::model::Role;
use crate::output::is_quiet;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::OM, text.style(theme().header.clone()));
}

pub fn banner(title: &str, subtitle: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("{} {}", Icons::STAR, title);
    println!("   {}", subtitle.style(theme().dim.clone()));
    println!();
}

pub fn success(label: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim.clone()).to_string()
}

/// Role name styled the way chat transcripts show it
pub fn role_label(role: Role) -> String {
    match role {
        Role::User => role.as_str().style(theme().user.clone()).to_string(),
        Role::Assistant => role.as_str().style(theme().assistant.clone()).to_string(),
    }
}
