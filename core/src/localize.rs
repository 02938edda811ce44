//! Localization hook for gas naming.

/// Strings the core needs translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringToken {
    Air,
    Oxygen,
    Helium,
    Nitrogen,
}

pub trait Localizer {
    fn string(&self, token: StringToken) -> String;
}

impl<F> Localizer for F
where
    F: Fn(StringToken) -> String,
{
    fn string(&self, token: StringToken) -> String {
        self(token)
    }
}

/// Built-in English strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct English;

impl Localizer for English {
    fn string(&self, token: StringToken) -> String {
        match token {
            StringToken::Air => "Air",
            StringToken::Oxygen => "Oxygen",
            StringToken::Helium => "Helium",
            StringToken::Nitrogen => "Nitrogen",
        }
        .to_string()
    }
}
