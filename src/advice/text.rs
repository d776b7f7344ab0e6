//! Pure functions that turn free text from the remote service into recommendation messages.

/// Candidates shorter than this many characters are discarded.
pub const MIN_CANDIDATE_LEN: usize = 20;

/// Words that mark a line as the start of a piece of advice.
const TRIGGER_WORDS: [&str; 4] = ["recommend", "suggest", "consider", "try"];

const BULLETS: [char; 3] = ['-', '*', '•'];

const FENCE: &str = "```";

/// A numbering marker has at most this many digits, so a year such as `2024.` is not one.
const MAX_MARKER_DIGITS: usize = 2;

/// Removes a leading and a trailing fenced-code-block marker, e.g. ```` ```json ````, if present.
pub fn strip_fences(content: &str) -> &str {
    let mut s = content.trim();
    if s.starts_with(FENCE) {
        s = match s.find('\n') {
            Some(ix) => &s[ix + 1..],
            None => &s[FENCE.len()..],
        };
    }
    let s = s.trim_end();
    s.strip_suffix(FENCE).unwrap_or(s).trim()
}

/// Splits free text into candidate recommendations.
///
/// A line that starts with a bullet (`-`, `*`, `•`) or a one- or two-digit number (`1.`, `12)`), or
/// that contains one of the trigger words, starts a new candidate. Following non-blank lines are
/// appended to it with a single space. A blank line ends it. Lines before the first candidate are ignored, as are
/// candidates shorter than `MIN_CANDIDATE_LEN` characters.
pub fn extract_candidates(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    for line in strip_fences(content).lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut current, &mut out);
        } else if starts_candidate(line) {
            flush(&mut current, &mut out);
            current = Some(strip_marker(line).to_string());
        } else if let Some(c) = current.as_mut() {
            c.push(' ');
            c.push_str(line);
        }
    }
    flush(&mut current, &mut out);
    out
}

fn flush(current: &mut Option<String>, out: &mut Vec<String>) {
    if let Some(c) = current.take() {
        if c.chars().count() >= MIN_CANDIDATE_LEN {
            out.push(c);
        }
    }
}

fn starts_candidate(line: &str) -> bool {
    if marker_len(line).is_some() {
        return true;
    }
    let lower = line.to_lowercase();
    TRIGGER_WORDS.iter().any(|w| lower.contains(w))
}

/// The byte length of a leading bullet or numbering marker.
fn marker_len(line: &str) -> Option<usize> {
    let first = line.chars().next()?;
    if BULLETS.contains(&first) {
        return Some(first.len_utf8());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || digits > MAX_MARKER_DIGITS {
        return None;
    }
    match line[digits..].chars().next() {
        Some('.') | Some(')') => Some(digits + 1),
        _ => None,
    }
}

fn strip_marker(line: &str) -> &str {
    match marker_len(line) {
        Some(len) => line[len..].trim(),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_fences("  {}  "), "{}");
        assert_eq!(strip_fences("{} ```"), "{}");
    }

    #[test]
    fn test_bullets_and_numbers() {
        let text = "Here is my advice:\n\
            - Cook at home more often to cut food costs\n\
            2) Cancel the streaming services you do not use\n\
            3. Walk\n\
            * Set aside ten percent of every paycheck";
        assert_eq!(
            extract_candidates(text),
            vec![
                "Cook at home more often to cut food costs",
                "Cancel the streaming services you do not use",
                "Set aside ten percent of every paycheck",
            ]
        );
    }

    #[test]
    fn test_continuation_lines_and_blank_line_end() {
        let text = "1. Build an emergency fund\n\
            covering three months of expenses.\n\
            \n\
            this line is ignored because nothing is open\n\
            You should consider a cheaper phone plan";
        assert_eq!(
            extract_candidates(text),
            vec![
                "Build an emergency fund covering three months of expenses.",
                "You should consider a cheaper phone plan",
            ]
        );
    }

    #[test]
    fn test_trigger_word_is_case_insensitive() {
        let out = extract_candidates("We Recommend reviewing your insurance yearly");
        assert_eq!(out, vec!["We Recommend reviewing your insurance yearly"]);
    }

    #[test]
    fn test_short_candidates_dropped() {
        assert!(extract_candidates("- too short\n- also short\nTry it").is_empty());
        assert!(extract_candidates("").is_empty());
        assert!(extract_candidates("no markers here at all, just prose").is_empty());
    }

    #[test]
    fn test_year_is_not_numbering() {
        let out = extract_candidates("2024 was expensive\n- Track every purchase for one month");
        assert_eq!(out, vec!["Track every purchase for one month"]);

        let out = extract_candidates(
            "2024. Was a hard year for many households\n\n12. Keep a list of every bill you pay",
        );
        assert_eq!(out, vec!["Keep a list of every bill you pay"]);
    }
}
