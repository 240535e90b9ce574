//! Internal helpers for validation and name matching.
//!
//! These utilities are **not** part of the public API. They centralize
//! normalization logic so every operation matches names the same way.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Lowercases, strips diacritics and trims (`"Manutenção "` -> `"manutencao"`).
pub(crate) fn fold_name(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Maintenance categories matched by name when no configured id applies.
pub(crate) fn is_maintenance_name(name: Option<&str>) -> bool {
    name.is_some_and(|name| fold_name(name).contains("manutencao"))
}

/// Case-insensitive `#RRGGBB` check.
pub(crate) fn is_hex_color(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_name_strips_accents_and_case() {
        assert_eq!(fold_name("  Manutenção "), "manutencao");
        assert_eq!(fold_name("Combustível"), "combustivel");
    }

    #[test]
    fn maintenance_matches_substrings() {
        assert!(is_maintenance_name(Some("Manutenção do carro")));
        assert!(is_maintenance_name(Some("MANUTENCAO")));
        assert!(!is_maintenance_name(Some("Mercado")));
        assert!(!is_maintenance_name(None));
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#5B5FEF"));
        assert!(is_hex_color("#abcdef"));
        assert!(!is_hex_color("5B5FEF"));
        assert!(!is_hex_color("#5B5FEG"));
    }
}
