//! Parsing of the parenthesized tags carried by No-Intro / Redump style names,
//! e.g. `Super Mario Bros. (USA) (Rev 1)` or `Tetris (Europe) (En,Fr,De)`.

use std::cmp::Ordering;

/// Region tokens recognised anywhere inside a tag group.
const REGION_TOKENS: &[(&str, &str)] = &[
    ("USA", "USA"),
    ("U", "USA"),
    ("America", "USA"),
    ("Europe", "Europe"),
    ("E", "Europe"),
    ("EU", "Europe"),
    ("Japan", "Japan"),
    ("J", "Japan"),
    ("JP", "Japan"),
    ("World", "World"),
    ("W", "World"),
    ("Brazil", "Brazil"),
    ("B", "Brazil"),
    ("BR", "Brazil"),
    ("Korea", "Korea"),
    ("K", "Korea"),
    ("KR", "Korea"),
    ("China", "China"),
    ("C", "China"),
    ("CN", "China"),
    ("Germany", "Germany"),
    ("G", "Germany"),
    ("France", "France"),
    ("F", "France"),
    ("Spain", "Spain"),
    ("S", "Spain"),
    ("Italy", "Italy"),
    ("I", "Italy"),
    ("Australia", "Australia"),
    ("A", "Australia"),
    ("Asia", "Asia"),
    ("Netherlands", "Netherlands"),
    ("Sweden", "Sweden"),
    ("Russia", "Russia"),
];

/// Short codes that collide with language codes; only honoured as a lone tag.
const LONE_REGION_TOKENS: &[(&str, &str)] = &[
    ("De", "Germany"),
    ("Fr", "France"),
    ("Es", "Spain"),
    ("It", "Italy"),
    ("Au", "Australia"),
    ("As", "Asia"),
    ("Nl", "Netherlands"),
    ("Sw", "Sweden"),
    ("Ru", "Russia"),
];

/// Contents of every `( ... )` group in order, without the parentheses.
pub fn paren_groups(name: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut rest = name;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        match after.find(')') {
            Some(close) => {
                groups.push(after[..close].trim());
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    groups
}

fn group_tokens(group: &str) -> impl Iterator<Item = &str> {
    group.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// First recognised region in the name's tags, or an empty string.
pub fn extract_region(name: &str) -> String {
    for group in paren_groups(name) {
        let tokens: Vec<&str> = group_tokens(group).collect();
        for token in &tokens {
            if let Some((_, region)) = REGION_TOKENS.iter().find(|(t, _)| t == token) {
                return (*region).to_string();
            }
        }
        if let [single] = tokens.as_slice() {
            if let Some((_, region)) = LONE_REGION_TOKENS.iter().find(|(t, _)| t == single) {
                return (*region).to_string();
            }
        }
    }
    String::new()
}

fn is_language_code(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(a), Some(b), None) if a.is_ascii_uppercase() && b.is_ascii_lowercase()
    )
}

/// Language list from the first tag made only of two-letter codes,
/// e.g. `(En,Fr,De)`. A lone code such as `(De)` is treated as a region.
pub fn extract_languages(name: &str) -> Vec<String> {
    for group in paren_groups(name) {
        let tokens: Vec<&str> = group_tokens(group).collect();
        if tokens.len() >= 2 && tokens.iter().all(|t| is_language_code(t)) {
            return tokens.into_iter().map(str::to_string).collect();
        }
    }
    Vec::new()
}

/// Revision marker parsed from `(Rev 1)`, `(Rev A)` or `(v1.1)`.
/// An untagged name is the original release and sorts before any revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revision(Vec<u32>);

impl Revision {
    pub fn parse(name: &str) -> Self {
        for group in paren_groups(name) {
            for token in group_tokens(group) {
                let rev = token
                    .strip_prefix("Rev ")
                    .or_else(|| token.strip_prefix("rev "));
                if let Some(rev) = rev {
                    if let Some(parts) = parse_revision_parts(rev) {
                        return Revision(parts);
                    }
                }
                if let Some(ver) = token.strip_prefix('v') {
                    if ver.starts_with(|c: char| c.is_ascii_digit()) {
                        if let Some(parts) = parse_revision_parts(ver) {
                            return Revision(parts);
                        }
                    }
                }
            }
        }
        Revision::default()
    }

    pub fn is_original(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_revision_parts(text: &str) -> Option<Vec<u32>> {
    let text = text.trim();
    if text.len() == 1 && text.chars().all(|c| c.is_ascii_alphabetic()) {
        let c = text.chars().next()?.to_ascii_uppercase();
        return Some(vec![(c as u32) - ('A' as u32) + 1]);
    }
    text.split('.').map(|p| p.trim().parse::<u32>().ok()).collect()
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Game identity with all `( ... )` and `[ ... ]` tags removed, lowercased.
pub fn base_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth_paren = 0usize;
    let mut depth_bracket = 0usize;
    for c in name.chars() {
        match c {
            '(' => depth_paren += 1,
            ')' if depth_paren > 0 => depth_paren -= 1,
            '[' => depth_bracket += 1,
            ']' if depth_bracket > 0 => depth_bracket -= 1,
            _ if depth_paren == 0 && depth_bracket == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
