//! Bullet extraction from free-form model output

pub const MAX_FACTS: usize = 3;

/// Strip a leading bullet marker, or `None` if the line is not a bullet.
///
/// `-` and `•` always start a bullet. `*` only does when followed by
/// whitespace, so `**bold**` headings are skipped.
fn strip_bullet(line: &str) -> Option<&str> {
    let line = line.trim();
    let rest = if let Some(rest) = line.strip_prefix('-') {
        rest
    } else if let Some(rest) = line.strip_prefix('•') {
        rest
    } else {
        let rest = line.strip_prefix('*')?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        rest
    };
    Some(rest.trim())
}

/// First [`MAX_FACTS`] bullet lines of `raw`, markers removed
pub fn parse_facts(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(strip_bullet)
        .filter(|fact| !fact.is_empty())
        .take(MAX_FACTS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_first_three_bullets() {
        let raw = "Here are some facts:\n- Lisbon has trams.\n• It is hilly.\n  - Custard tarts.\n- A fourth one.";
        assert_eq!(
            parse_facts(raw),
            vec!["Lisbon has trams.", "It is hilly.", "Custard tarts."]
        );
    }

    #[test]
    fn test_ignores_non_bullet_lines() {
        assert!(parse_facts("Lisbon is a city.\nIt has trams.").is_empty());
        assert!(parse_facts("").is_empty());
    }

    #[test]
    fn test_star_bullets_need_whitespace() {
        let raw = "**Fun facts**\n* Pigeons outnumber benches.\n*   Trams are yellow.";
        assert_eq!(
            parse_facts(raw),
            vec!["Pigeons outnumber benches.", "Trams are yellow."]
        );
    }

    #[test]
    fn test_empty_bullets_are_dropped() {
        assert_eq!(parse_facts("-\n- real"), vec!["real"]);
    }
}
