//! Administrative subcommands. Each one works on the already connected
//! store, so key prefixes (`REDIS_ENV`) apply exactly as they do for `serve`.

pub mod backup;
pub mod clear;
pub mod events;
pub mod init;
pub mod overview;
pub mod ping;
pub mod sync;

/// Longest string value shown in listings before it is cut.
pub const PREVIEW_CHARS: usize = 100;

/// First `PREVIEW_CHARS` characters of `value`, with an ellipsis when cut.
pub fn preview(value: &str) -> String {
    let mut chars = value.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Human label for the key prefix environment.
pub fn environment_label(prefix: Option<&str>) -> String {
    match prefix {
        Some(env) => format!("{} environment (prefix: {}-)", env.to_uppercase(), env),
        None => "default environment (no prefix)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(PREVIEW_CHARS + 1);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn environment_label_names_prefix() {
        assert_eq!(
            environment_label(Some("dev")),
            "DEV environment (prefix: dev-)"
        );
        assert_eq!(environment_label(None), "default environment (no prefix)");
    }
}
