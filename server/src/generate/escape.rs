//! Escaping engine for generated artifacts
//!
//! The same raw value crosses up to three textual grammars on its way to a
//! running container: a compose-YAML scalar (subject to the compose reader's
//! `$`-interpolation pass), an env-file `KEY=VALUE` line, and, for remote
//! deployments, a shell command line. Each grammar gets exactly one pure
//! function here; call sites never inline quoting logic.

/// Special characters that force double-quoting in an env-file value.
const ENV_SPECIAL: &[char] = &[
    ' ', '"', '\\', '&', '|', ';', '(', ')', '<', '>', '`',
];

/// Escape a value destined for a compose-YAML environment mapping.
///
/// Compose readers run a variable-substitution pass over the document before
/// YAML parsing, so every literal `$` must be doubled. The YAML emitter's own
/// quoting is layered on top when the string needs it.
pub fn compose_value(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    raw.replace('$', "$$")
}

/// Undo the compose-reader interpolation collapse (`$$` -> `$`).
///
/// Used when a parsed compose document is translated back into an imperative
/// run invocation, where no substitution pass will happen.
pub fn collapse_compose_dollars(escaped: &str) -> String {
    escaped.replace("$$", "$")
}

/// Escape a value destined for an env-file `KEY=VALUE` line.
///
/// Values containing `$` are single-quoted, which env-file readers treat as
/// interpolation-suppressing; embedded single quotes use the `'\''` form.
/// Values containing other special characters are double-quoted with embedded
/// double quotes escaped. Plain values pass through unquoted.
pub fn env_file_value(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    if raw.contains('$') {
        return format!("'{}'", raw.replace('\'', "'\\''"));
    }

    if raw.chars().any(|c| ENV_SPECIAL.contains(&c)) {
        return format!("\"{}\"", raw.replace('"', "\\\""));
    }

    raw.to_string()
}

/// Quote a value for a remote shell command line.
///
/// This is the transport-specific pass applied on top of the file-grammar
/// escaping when a sensitive value crosses into an SSH command: single quotes
/// suppress all shell expansion, with embedded single quotes closed, escaped,
/// and reopened.
pub fn shell_single_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "'\\''"))
}

/// Whether a value needs the defensive shell re-quoting pass before being
/// placed on a remote command line.
pub fn needs_shell_quoting(raw: &str) -> bool {
    raw.contains('$') || raw.contains('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_value_doubles_dollars() {
        assert_eq!(compose_value("P@$$w0rd$x"), "P@$$$$w0rd$$x");
        assert_eq!(compose_value("plain"), "plain");
        assert_eq!(compose_value(""), "");
    }

    #[test]
    fn test_compose_round_trip() {
        let original = "$w33t@55T3a!";
        assert_eq!(collapse_compose_dollars(&compose_value(original)), original);
    }

    #[test]
    fn test_env_file_dollar_values_single_quoted() {
        assert_eq!(env_file_value("P@$$w0rd$x"), "'P@$$w0rd$x'");
        assert_eq!(env_file_value("$"), "'$'");
    }

    #[test]
    fn test_env_file_embedded_single_quote() {
        assert_eq!(env_file_value("it's$a"), "'it'\\''s$a'");
    }

    #[test]
    fn test_env_file_special_chars_double_quoted() {
        assert_eq!(env_file_value("two words"), "\"two words\"");
        assert_eq!(env_file_value("a;b"), "\"a;b\"");
        assert_eq!(env_file_value("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(env_file_value("back`tick"), "\"back`tick\"");
    }

    #[test]
    fn test_env_file_plain_values_unquoted() {
        assert_eq!(env_file_value("admin"), "admin");
        assert_eq!(env_file_value("8G"), "8G");
        assert_eq!(env_file_value(""), "");
    }

    #[test]
    fn test_shell_single_quote() {
        assert_eq!(shell_single_quote("P@$$w0rd"), "'P@$$w0rd'");
        assert_eq!(shell_single_quote("a'b"), "'a'\\''b'");
    }

    #[test]
    fn test_needs_shell_quoting() {
        assert!(needs_shell_quoting("ha$h"));
        assert!(needs_shell_quoting("say \"hi\""));
        assert!(!needs_shell_quoting("plain-value"));
    }
}
