//! Printer selection from a print-subsystem listing

use std::sync::LazyLock;

use regex::Regex;

// `printer NAME is idle` or `printer "NAME WITH SPACES" is idle`
static PRINTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"printer\s+([^"\s]+)|printer\s+"([^"]+)""#).expect("valid regex")
});

/// Printer names found in `lpstat -p` output, in listing order
#[must_use]
pub fn parse_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let caps = PRINTER_LINE.captures(line)?;
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Pick the printer to use
///
/// Candidates are names containing any of `patterns` (case-insensitive).
/// A name without a parenthetical suffix wins over one with it; otherwise
/// the first candidate is taken.
#[must_use]
pub fn choose_printer<'a>(names: &'a [String], patterns: &[String]) -> Option<&'a str> {
    let patterns: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
    let candidates: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| {
            let lower = name.to_lowercase();
            patterns.iter().any(|p| lower.contains(p.as_str()))
        })
        .collect();

    candidates
        .iter()
        .copied()
        .find(|name| !has_parenthetical_suffix(name))
        .or_else(|| candidates.first().copied())
}

fn has_parenthetical_suffix(name: &str) -> bool {
    let trimmed = name.trim_end();
    trimmed.ends_with(')') && trimmed.contains('(')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec!["l4260".to_string(), "4260".to_string()]
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn prefers_name_without_suffix() {
        let names = names(&["EPSON_L4260_Series", "EPSON L4260 Series (AirPrint)"]);
        assert_eq!(choose_printer(&names, &patterns()), Some("EPSON_L4260_Series"));

        let reversed = vec![names[1].clone(), names[0].clone()];
        assert_eq!(
            choose_printer(&reversed, &patterns()),
            Some("EPSON_L4260_Series")
        );
    }

    #[test]
    fn single_suffixed_candidate_is_taken() {
        let names = names(&["EPSON L4260 Series (AirPrint)"]);
        assert_eq!(
            choose_printer(&names, &patterns()),
            Some("EPSON L4260 Series (AirPrint)")
        );
    }

    #[test]
    fn no_match_yields_none() {
        let names = names(&["HP_LaserJet", "Canon_G3010"]);
        assert_eq!(choose_printer(&names, &patterns()), None);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let names = names(&["epson-l4260"]);
        assert_eq!(
            choose_printer(&names, &["L4260".to_string()]),
            Some("epson-l4260")
        );
    }

    #[test]
    fn parses_quoted_and_bare_names() {
        let listing = "printer EPSON_L4260_Series is idle.  enabled since Mon\n\
                       printer \"EPSON L4260 Series (AirPrint)\" is idle.\n\
                       \tDescription: EPSON\n\
                       printer Office_Laser disabled since Tue\n";
        assert_eq!(
            parse_listing(listing),
            vec![
                "EPSON_L4260_Series",
                "EPSON L4260 Series (AirPrint)",
                "Office_Laser"
            ]
        );
    }
}
