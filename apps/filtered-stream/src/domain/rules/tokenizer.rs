//! Text Tokenizer
//!
//! Splits free text into lowercase tokens on whitespace, punctuation and
//! symbol boundaries. Emoji are kept as single-character tokens so that
//! emoji rules can match against tokenized text.

/// Split `text` into normalized lowercase tokens.
///
/// Letters, digits and `_` form words. Emoji become tokens of their own.
/// Everything else, including zero-width joiners and variation selectors,
/// is a separator.
///
/// ```rust
/// use filtered_stream::domain::rules::tokenize;
///
/// assert_eq!(tokenize("Breaking: NEWS-today!"), vec!["breaking", "news", "today"]);
/// ```
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.extend(ch.to_lowercase());
        } else {
            flush(&mut current, &mut tokens);
            if is_emoji(ch) {
                tokens.push(ch.to_string());
            }
        }
    }
    flush(&mut current, &mut tokens);

    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Check whether a character falls in an emoji or pictographic symbol block.
#[must_use]
pub const fn is_emoji(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1F000..=0x1FAFF   // pictographs, emoticons, transport, symbols ext
            | 0x2600..=0x27BF // misc symbols, dingbats
            | 0x2300..=0x23FF // misc technical (watch, hourglass)
            | 0x2B00..=0x2BFF // arrows, stars
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
    )
}

/// Check whether a string contains any emoji character.
#[must_use]
pub fn contains_emoji(text: &str) -> bool {
    text.chars().any(is_emoji)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace_and_punctuation() {
        assert_eq!(
            tokenize("Hello, world!  How's it going?"),
            vec!["hello", "world", "how", "s", "it", "going"]
        );
    }

    #[test]
    fn strips_sigils() {
        assert_eq!(
            tokenize("#AI news from @alice $TSLA"),
            vec!["ai", "news", "from", "alice", "tsla"]
        );
    }

    #[test]
    fn keeps_underscores_and_digits() {
        assert_eq!(tokenize("rust_lang 2024"), vec!["rust_lang", "2024"]);
    }

    #[test]
    fn emoji_are_single_tokens() {
        assert_eq!(tokenize("great🔥day"), vec!["great", "🔥", "day"]);
        assert_eq!(tokenize("👍🏽"), vec!["👍", "🏽"]);
    }

    #[test]
    fn zero_width_joiner_is_a_separator() {
        assert_eq!(tokenize("👩\u{200D}💻"), vec!["👩", "💻"]);
    }

    #[test]
    fn lowercases_unicode() {
        assert_eq!(tokenize("ÜBER Straße"), vec!["über", "straße"]);
    }

    #[test]
    fn empty_and_symbol_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" ... --- !!! ").is_empty());
    }

    #[test]
    fn concatenated_words_stay_one_token() {
        assert_eq!(tokenize("breakingnews"), vec!["breakingnews"]);
    }

    #[test]
    fn emoji_detection() {
        assert!(contains_emoji("so 🔥"));
        assert!(contains_emoji("☕"));
        assert!(!contains_emoji("plain text #tag"));
    }
}
