use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Removes accents by decomposing (NFD) and dropping combining marks.
/// Letters with no decomposition get a plain Latin stand-in.
pub fn strip_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            'đ' => out.push('d'),
            'Đ' => out.push('D'),
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            _ => out.push(c),
        }
    }
    out
}

/// Emoji, pictographs, dingbats and the joiners/selectors that glue them.
pub fn is_pictographic(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF
        | 0x2600..=0x27BF
        | 0x2300..=0x23FF
        | 0x2B00..=0x2BFF
        | 0x2190..=0x21FF
        | 0x25A0..=0x25FF
        | 0x3030 | 0x303D | 0x3297 | 0x3299
        | 0x200D
        | 0x20E3
        | 0xFE00..=0xFE0F
        | 0xE0020..=0xE007F
    )
}

pub fn strip_pictographs(input: &str) -> String {
    input.chars().filter(|c| !is_pictographic(*c)).collect()
}

/// Text safe for the fiscal printer: no pictographs, no diacritics, no
/// separator or control characters, single spaces, at most `limit` chars.
pub fn fiscal_text(input: &str, separator: char, limit: usize) -> String {
    let cleaned = strip_diacritics(&strip_pictographs(input));
    let spaced: String = cleaned
        .chars()
        .map(|c| if c == separator || c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    collapsed
        .chars()
        .take(limit)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn romanian_diacritics_are_stripped() {
        assert_eq!(strip_diacritics("Ciorbă de burtă"), "Ciorba de burta");
        assert_eq!(strip_diacritics("ȘNIȚEL țărănesc"), "SNITEL taranesc");
        assert_eq!(strip_diacritics("şi ţuică"), "si tuica");
    }

    #[test]
    fn letters_without_decomposition_get_stand_ins() {
        assert_eq!(strip_diacritics("Łódź straße"), "Lodz strasse");
    }

    #[test]
    fn emoji_sequences_are_removed() {
        assert_eq!(strip_pictographs("Pizza 🍕 hot 🌶️"), "Pizza  hot ");
        assert_eq!(strip_pictographs("👨‍🍳 Chef"), " Chef");
        assert_eq!(strip_pictographs("Menu ★ ☕"), "Menu  ");
    }

    #[test]
    fn fiscal_text_cleans_and_truncates() {
        let out = fiscal_text("🍝 Paste carbonara; cu parmezan și ou extra", ';', 20);
        assert_eq!(out, "Paste carbonara cu p");
        assert!(out.chars().count() <= 20);
    }

    #[test]
    fn fiscal_text_never_exceeds_limit_or_keeps_marks() {
        let samples = [
            "Salată de vinete 🍆🍆🍆 cu ceapă roșie",
            "Ciorbă rădăuțeană",
            "",
            "☕☕☕",
            "Très long nom de produit à découper absolument",
        ];
        for limit in [1usize, 5, 12, 30] {
            for sample in samples {
                let out = fiscal_text(sample, ';', limit);
                assert!(out.chars().count() <= limit, "{out:?} over {limit}");
                assert!(out.chars().all(|c| !is_combining_mark(c) && !is_pictographic(c)));
                assert!(!out.contains('ă') && !out.contains('é') && !out.contains('ț'));
            }
        }
    }

    #[test]
    fn separator_is_replaced() {
        assert_eq!(fiscal_text("A^B", '^', 30), "A B");
    }
}
