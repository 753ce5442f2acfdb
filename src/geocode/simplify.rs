//! Address simplification for geocoding queries.
//!
//! Backend delivery addresses carry tokens the geocoding provider
//! chokes on: postal codes, residential qualifiers ("Casa", "Apto 301"),
//! placeholder neighborhood labels. The rules here rewrite an address
//! into an ordered sequence of progressively simpler candidate queries;
//! the resolver tries them in order and stops at the first hit.
//!
//! Everything in this module is pure string transformation and operates
//! on the comma-separated segments of a Brazilian-format address.

/// Residential qualifiers that never help the geocoder. A segment whose
/// first word is one of these is dropped entirely.
const UNIT_QUALIFIERS: &[&str] = &[
    "casa", "apartamento", "apto", "ap", "sala", "loja", "galpão", "sobrado", "bloco", "torre",
];

/// Placeholder neighborhood labels meaning "not informed".
const PLACEHOLDER_NEIGHBORHOODS: &[&str] =
    &["outros/não informado", "não informado", "outros", "n/a", "s/n"];

/// Normalize an address into its cache key: lowercase, trimmed, internal
/// whitespace collapsed to single spaces.
pub fn cache_key(address: &str) -> String {
    address
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_word(segment: &str) -> &str {
    segment.split_whitespace().next().unwrap_or("")
}

fn is_postal_code_segment(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    let Some(rest) = lower.strip_prefix("cep") else {
        return false;
    };
    let rest = rest.trim_start().trim_start_matches(':').trim();
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || "-. ".contains(c))
}

fn is_range_segment(segment: &str) -> bool {
    let Some((head, rest)) = segment.split_once(char::is_whitespace) else {
        return false;
    };
    if head.to_lowercase() != "até" {
        return false;
    }
    let rest = rest.trim();
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || "/-".contains(c))
}

fn is_unit_qualifier_segment(segment: &str) -> bool {
    let word = first_word(segment).to_lowercase();
    UNIT_QUALIFIERS.contains(&word.as_str())
}

/// Strip noise tokens from a full address. Segments are dropped or
/// rewritten in place; order of the surviving segments is preserved.
pub fn simplify_address(address: &str) -> String {
    let mut kept: Vec<String> = Vec::new();

    for raw_segment in address.split(',') {
        let segment = raw_segment.trim();
        if segment.is_empty() {
            continue;
        }
        if is_postal_code_segment(segment) || is_range_segment(segment) {
            continue;
        }
        if is_unit_qualifier_segment(segment) {
            continue;
        }

        // "Bairro X" keeps X unless X is a placeholder label.
        if first_word(segment).eq_ignore_ascii_case("bairro") {
            let name = segment[first_word(segment).len()..].trim();
            let lower_name = name.to_lowercase();
            if lower_name.is_empty()
                || PLACEHOLDER_NEIGHBORHOODS.iter().any(|p| lower_name.starts_with(p))
            {
                continue;
            }
            kept.push(name.to_string());
            continue;
        }

        kept.push(segment.to_string());
    }

    kept.join(", ")
}

/// Remove the street-number segment, keeping street, neighborhood, city
/// and state. Only an interior all-digit segment qualifies; if none is
/// found the address is returned unchanged.
pub fn strip_street_number(address: &str) -> String {
    let segments: Vec<&str> = address.split(',').map(str::trim).collect();
    if segments.len() < 3 {
        return address.to_string();
    }

    let number_idx = segments[1..segments.len() - 1]
        .iter()
        .position(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .map(|i| i + 1);

    match number_idx {
        Some(idx) => segments
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, s)| *s)
            .collect::<Vec<_>>()
            .join(", "),
        None => address.to_string(),
    }
}

/// Extract a trailing "City, ST" pair if the address has one: a
/// two-letter uppercase state code preceded by an alphabetic segment.
pub fn extract_city_state(address: &str) -> Option<String> {
    let segments: Vec<&str> = address.split(',').map(str::trim).collect();

    for i in 1..segments.len() {
        let state = segments[i];
        let code: Vec<char> = state.chars().take(3).collect();
        let is_state = code.len() >= 2
            && code[0].is_ascii_uppercase()
            && code[1].is_ascii_uppercase()
            && (code.len() == 2 || code[2].is_whitespace());
        if !is_state {
            continue;
        }

        let city = segments[i - 1];
        let city_ok = !city.is_empty()
            && city.chars().all(|c| c.is_alphabetic() || c.is_whitespace())
            && city.chars().any(|c| c.is_alphabetic());
        if city_ok {
            return Some(format!("{}, {}", city, &state[..2]));
        }
    }

    None
}

/// The ordered list of candidate queries for one address. Duplicates of
/// an earlier candidate are omitted so the resolver never wastes a
/// rate-limited request repeating a query.
pub fn candidate_queries(address: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    let simplified = simplify_address(address);
    if !simplified.is_empty() {
        candidates.push(simplified.clone());
    }

    let without_number = strip_street_number(&simplified);
    if !without_number.is_empty() && without_number != simplified {
        candidates.push(without_number);
    }

    if let Some(city_state) = extract_city_state(address) {
        if !candidates.contains(&city_state) {
            candidates.push(city_state);
        }
    }

    candidates
}
