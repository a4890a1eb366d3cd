//! Output normalization and echo detection.

use std::borrow::Cow;

use regex::bytes::Regex;

/// Drop every carriage return from a chunk.
pub fn strip_carriage_returns(chunk: &[u8]) -> Cow<'_, [u8]> {
    if memchr::memchr(b'\r', chunk).is_none() {
        return Cow::Borrowed(chunk);
    }
    Cow::Owned(chunk.iter().copied().filter(|&b| b != b'\r').collect())
}

/// Canonical form used to compare typed input with its echo: backspaces and
/// all whitespace removed, ASCII lowercased.
pub fn normalize_echo(data: &[u8]) -> Vec<u8> {
    data.iter()
        .copied()
        .filter(|&b| b != 0x08 && !b.is_ascii_whitespace())
        .map(|b| b.to_ascii_lowercase())
        .collect()
}

/// True once `buffer` shows the echo of `input`.
///
/// With `auto_expand` an echo the CLI completed from abbreviated words
/// (`sh ver` echoed as `show version`) also counts.
pub fn echo_observed(buffer: &[u8], input: &[u8], auto_expand: bool) -> bool {
    let needle = normalize_echo(input);
    if needle.is_empty() {
        return true;
    }
    if memchr::memmem::find(&normalize_echo(buffer), &needle).is_some() {
        return true;
    }
    auto_expand && is_auto_expanded(buffer, input)
}

/// Bytes a prompt usually ends with.
const PROMPT_TERMINATORS: &[u8] = b"#>$%:]";

/// True when some line of `buffer` holds a run of words, each starting with
/// the corresponding word of `input`.
///
/// CLIs often redraw the completed line together with the prompt
/// (`router#show version`), so the first word may also start right after a
/// prompt terminator inside the shown word.
pub fn is_auto_expanded(buffer: &[u8], input: &[u8]) -> bool {
    let typed: Vec<Vec<u8>> = words(input).collect();
    let Some((first, rest)) = typed.split_first() else {
        return false;
    };

    buffer.split(|&b| b == b'\n').any(|line| {
        let shown: Vec<Vec<u8>> = words(line).collect();
        shown.windows(typed.len()).any(|window| {
            expands_after_prompt(&window[0], first)
                && window[1..]
                    .iter()
                    .zip(rest)
                    .all(|(shown, typed)| shown.starts_with(typed))
        })
    })
}

fn expands_after_prompt(shown: &[u8], typed: &[u8]) -> bool {
    if shown.starts_with(typed) {
        return true;
    }
    shown
        .iter()
        .enumerate()
        .filter(|(_, b)| PROMPT_TERMINATORS.contains(b))
        .any(|(i, _)| shown[i + 1..].starts_with(typed))
}

fn words(data: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
    data.split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            w.iter()
                .copied()
                .filter(|&b| b != 0x08)
                .map(|b| b.to_ascii_lowercase())
                .collect()
        })
}

/// Turn the bytes read after submitting a command into its processed output.
///
/// Trailing whitespace is removed from every line. With `strip_prompt` the
/// final line is dropped when `prompt` matches it. Then one leading
/// `return_char` and all trailing whitespace are trimmed.
pub fn process_output(
    data: &[u8],
    strip_prompt: bool,
    prompt: Option<&Regex>,
    return_char: &str,
) -> String {
    let text = String::from_utf8_lossy(data);
    let mut lines: Vec<&str> = text.split('\n').map(str::trim_end).collect();

    if strip_prompt {
        while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let ends_with_prompt = match (prompt, lines.last()) {
            (Some(prompt), Some(last)) => prompt.is_match(last.as_bytes()),
            _ => false,
        };
        if ends_with_prompt {
            lines.pop();
        }
    }

    let joined = lines.join("\n");
    let body = if return_char.is_empty() {
        joined.as_str()
    } else {
        joined.strip_prefix(return_char).unwrap_or(joined.as_str())
    };
    body.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Regex {
        Regex::new(r"(?mi)^\S+#\s?$").unwrap()
    }

    #[test]
    fn test_strip_carriage_returns() {
        assert_eq!(&*strip_carriage_returns(b"a\r\nb\r\n"), b"a\nb\n");
        assert!(matches!(strip_carriage_returns(b"plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_echo_normalization() {
        assert_eq!(normalize_echo(b"Show  Ver\x08\x08version\n"), b"showverversion");
        assert!(echo_observed(b"switch#show   version", b"show version", false));
        assert!(echo_observed(b"SHOW VERSION", b"show version", false));
        assert!(!echo_observed(b"show", b"show version", false));
        assert!(echo_observed(b"anything", b"   ", false));
    }

    #[test]
    fn test_auto_expanded_echo() {
        assert!(is_auto_expanded(b"router#show version", b"sh ver"));
        assert!(is_auto_expanded(b"banner\nconfigure terminal", b"conf t"));
        assert!(!is_auto_expanded(b"show version", b"sh int"));
        assert!(is_auto_expanded(b"switch(config)#interface Ethernet1", b"int Ethernet1"));
        assert!(!is_auto_expanded(b"pushed version", b"sh ver"));
        assert!(echo_observed(b"router#show version", b"sh ver", true));
        assert!(!echo_observed(b"show version", b"sh ver", false));
        assert!(echo_observed(b"show version", b"sh ver", true));
    }

    #[test]
    fn test_process_output_strips_prompt_and_return() {
        let output = process_output(b"\nOUTPUT\nswitch#", true, Some(&prompt()), "\n");
        assert_eq!(output, "OUTPUT");

        let output = process_output(b"\nline 1   \nline 2\t\nswitch# \n", true, Some(&prompt()), "\n");
        assert_eq!(output, "line 1\nline 2");
    }

    #[test]
    fn test_process_output_keeps_prompt_when_asked() {
        let output = process_output(b"\nOUTPUT\nswitch#", false, Some(&prompt()), "\n");
        assert_eq!(output, "OUTPUT\nswitch#");
    }

    #[test]
    fn test_process_output_only_one_leading_return() {
        let output = process_output(b"\n\nindented\nswitch#", true, Some(&prompt()), "\n");
        assert_eq!(output, "\nindented");
    }

    #[test]
    fn test_process_output_non_prompt_last_line() {
        let output = process_output(b"\nOUTPUT\nmore", true, Some(&prompt()), "\n");
        assert_eq!(output, "OUTPUT\nmore");
    }
}
