//! Character set tables: G0 national option sub-sets, full non-Latin G0
//! alphabets, the Latin G2 supplementary set, and diacritic composition.
//!
//! ref: ETS 300 706 section 15 (character sets) and table 32 (designation codes).

use serde::{Deserialize, Serialize};

/// G0 character set variant selected by a designation code or by the
/// page header national option bits C12..C14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NationalSubset {
    #[default]
    English,
    German,
    SwedishFinnishHungarian,
    Italian,
    French,
    PortugueseSpanish,
    CzechSlovak,
    Polish,
    Estonian,
    LatvianLithuanian,
    Romanian,
    SerbianCroatianSlovenian,
    Turkish,
    /// Russian/Bulgarian Cyrillic alphabet.
    Cyrillic,
    Greek,
    Hebrew,
    Arabic,
}

/// Positions remapped by the Latin national option sub-sets.
const NATIONAL_POSITIONS: [u8; 13] = [
    0x23, 0x24, 0x40, 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, 0x60, 0x7B, 0x7C, 0x7D, 0x7E,
];

const ENGLISH: [char; 13] = ['£', '$', '@', '←', '½', '→', '↑', '#', '―', '¼', '‖', '¾', '÷'];
const GERMAN: [char; 13] = ['#', '$', '§', 'Ä', 'Ö', 'Ü', '^', '_', '°', 'ä', 'ö', 'ü', 'ß'];
const SWEDISH: [char; 13] = ['#', '¤', 'É', 'Ä', 'Ö', 'Å', 'Ü', '_', 'é', 'ä', 'ö', 'å', 'ü'];
const ITALIAN: [char; 13] = ['£', '$', 'é', '°', 'ç', '→', '↑', '#', 'ù', 'à', 'ò', 'è', 'ì'];
const FRENCH: [char; 13] = ['é', 'ï', 'à', 'ë', 'ê', 'ù', 'î', '#', 'è', 'â', 'ô', 'û', 'ç'];
const PORTUGUESE: [char; 13] = ['ç', '$', '¡', 'á', 'é', 'í', 'ó', 'ú', '¿', 'ü', 'ñ', 'è', 'à'];
const CZECH: [char; 13] = ['#', 'ů', 'č', 'ť', 'ž', 'ý', 'í', 'ř', 'é', 'á', 'ě', 'ú', 'š'];
const POLISH: [char; 13] = ['#', 'ń', 'ą', 'Ƶ', 'Ś', 'Ł', 'ć', 'ó', 'ę', 'ż', 'ś', 'ł', 'ź'];
const ESTONIAN: [char; 13] = ['#', 'õ', 'Š', 'Ä', 'Ö', 'Ž', 'Ü', 'Õ', 'š', 'ä', 'ö', 'ž', 'ü'];
const LATVIAN: [char; 13] = ['#', '$', 'Š', 'ė', 'ę', 'Ž', 'č', 'ū', 'š', 'ą', 'ų', 'ž', 'į'];
const ROMANIAN: [char; 13] = ['#', '¤', 'Ţ', 'Â', 'Ş', 'Ă', 'Î', 'ı', 'ţ', 'â', 'ş', 'ă', 'î'];
const SERBIAN: [char; 13] = ['#', 'Ë', 'Č', 'Ć', 'Ž', 'Đ', 'Š', 'ë', 'č', 'ć', 'ž', 'đ', 'š'];
const TURKISH: [char; 13] = ['₺', 'ğ', 'İ', 'Ş', 'Ö', 'Ç', 'Ü', 'Ğ', 'ı', 'ş', 'ö', 'ç', 'ü'];

/// Russian/Bulgarian letters at 0x40..=0x7E.
const CYRILLIC: &str = "ЮАБЦДЕФГХИЙКЛМНОПЯРСТУЖВЬЫЗШЭЩЧЪюабцдефгхийклмнопярстужвьызшэщч";

/// Arabic letters at 0x41..=0x5A and 0x61..=0x7A (isolated forms).
const ARABIC: &str = "ابتثجحخدذرزسشصضطظعغفقكلمنه";

/// Latin G2 supplementary set, 0x20..=0x7F.
const G2_LATIN: &str = concat!(
    " ¡¢£$¥#§¤‘“«←↑→↓",
    "°±²³×µ¶·÷’”»¼½¾¿",
    " ̀́̂̃̄̆̇̈.̧̊_̨̋̌",
    "―¹®©™♪₠‰α   ⅛⅜⅝⅞",
    "ΩÆĐªĦ ĲĿŁØŒºÞŦŊŉ",
    "ĸæđðħıĳŀłøœßþŧŋ■",
);

impl NationalSubset {
    /// Resolve a 7-bit G0/G2 designation code (packet 28/29, or a
    /// Level-2.5 modified designation triplet).
    pub fn from_designation(code: u8) -> Self {
        use NationalSubset::*;
        match code & 0x7F {
            0x00 | 0x10 => English,
            0x01 | 0x09 | 0x11 | 0x21 => German,
            0x02 | 0x0A | 0x12 => SwedishFinnishHungarian,
            0x03 | 0x0B | 0x13 => Italian,
            0x04 | 0x0C | 0x14 | 0x44 => French,
            0x05 | 0x15 => PortugueseSpanish,
            0x06 | 0x0E | 0x26 => CzechSlovak,
            0x08 => Polish,
            0x16 | 0x36 => Turkish,
            0x1D => SerbianCroatianSlovenian,
            0x1F => Romanian,
            0x22 => Estonian,
            0x23 => LatvianLithuanian,
            0x20 | 0x24 | 0x25 => Cyrillic,
            0x37 => Greek,
            0x55 => Hebrew,
            0x47 | 0x57 => Arabic,
            _ => English,
        }
    }

    /// Resolve the national option from header control bits C12..C14
    /// (designation group 0).
    pub fn from_control_bits(bits: u8) -> Self {
        Self::from_designation(bits & 0x07)
    }

    /// Whether this sub-set replaces the whole upper half of G0.
    pub fn is_full_alphabet(self) -> bool {
        matches!(
            self,
            NationalSubset::Cyrillic
                | NationalSubset::Greek
                | NationalSubset::Hebrew
                | NationalSubset::Arabic
        )
    }

    fn latin_table(self) -> Option<&'static [char; 13]> {
        use NationalSubset::*;
        Some(match self {
            English => &ENGLISH,
            German => &GERMAN,
            SwedishFinnishHungarian => &SWEDISH,
            Italian => &ITALIAN,
            French => &FRENCH,
            PortugueseSpanish => &PORTUGUESE,
            CzechSlovak => &CZECH,
            Polish => &POLISH,
            Estonian => &ESTONIAN,
            LatvianLithuanian => &LATVIAN,
            Romanian => &ROMANIAN,
            SerbianCroatianSlovenian => &SERBIAN,
            Turkish => &TURKISH,
            Cyrillic | Greek | Hebrew | Arabic => return None,
        })
    }
}

/// Map a G0 code (0x20..=0x7F) to a Unicode character for `subset`.
pub fn map_g0(subset: NationalSubset, code: u8) -> char {
    let code = code & 0x7F;
    if code < 0x20 {
        return ' ';
    }
    if code == 0x7F {
        return '■';
    }

    if let Some(table) = subset.latin_table() {
        return NATIONAL_POSITIONS
            .iter()
            .position(|&p| p == code)
            .map(|i| table[i])
            .unwrap_or(code as char);
    }

    match subset {
        NationalSubset::Cyrillic if code >= 0x40 => {
            CYRILLIC.chars().nth((code - 0x40) as usize).unwrap_or(' ')
        }
        NationalSubset::Greek if code >= 0x40 => {
            // Greek follows the ISO 8859-7 layout shifted down by 0x80.
            match char::from_u32(0x0390 + (code - 0x40) as u32) {
                Some('\u{03A2}') | None => 'ʹ',
                Some(c) => c,
            }
        }
        NationalSubset::Hebrew if (0x60..=0x7A).contains(&code) => {
            char::from_u32(0x05D0 + (code - 0x60) as u32).unwrap_or(' ')
        }
        NationalSubset::Arabic if (0x41..=0x5A).contains(&code) => {
            ARABIC.chars().nth((code - 0x41) as usize).unwrap_or(' ')
        }
        NationalSubset::Arabic if (0x61..=0x7A).contains(&code) => {
            ARABIC.chars().nth((code - 0x61) as usize).unwrap_or(' ')
        }
        _ => code as char,
    }
}

/// Map a Latin G2 code (0x20..=0x7F) to a Unicode character.
pub fn map_g2(code: u8) -> char {
    let code = code & 0x7F;
    if code < 0x20 {
        return ' ';
    }
    G2_LATIN.chars().nth((code - 0x20) as usize).unwrap_or(' ')
}

/// Compose a base character with one of the 15 G2 diacritical marks
/// (`0` means no mark). Falls back to the bare base character when no
/// precomposed form exists.
pub fn compose(base: char, diacritic: u8) -> char {
    let composed = match (diacritic & 0x0F, base) {
        (0, _) => None,
        (1, 'a') => Some('à'),
        (1, 'e') => Some('è'),
        (1, 'i') => Some('ì'),
        (1, 'o') => Some('ò'),
        (1, 'u') => Some('ù'),
        (1, 'A') => Some('À'),
        (1, 'E') => Some('È'),
        (2, 'a') => Some('á'),
        (2, 'e') => Some('é'),
        (2, 'i') => Some('í'),
        (2, 'o') => Some('ó'),
        (2, 'u') => Some('ú'),
        (2, 'y') => Some('ý'),
        (2, 'c') => Some('ć'),
        (2, 'n') => Some('ń'),
        (2, 's') => Some('ś'),
        (2, 'z') => Some('ź'),
        (2, 'A') => Some('Á'),
        (2, 'E') => Some('É'),
        (2, 'O') => Some('Ó'),
        (3, 'a') => Some('â'),
        (3, 'e') => Some('ê'),
        (3, 'i') => Some('î'),
        (3, 'o') => Some('ô'),
        (3, 'u') => Some('û'),
        (4, 'a') => Some('ã'),
        (4, 'n') => Some('ñ'),
        (4, 'o') => Some('õ'),
        (4, 'N') => Some('Ñ'),
        (8, 'a') => Some('ä'),
        (8, 'e') => Some('ë'),
        (8, 'i') => Some('ï'),
        (8, 'o') => Some('ö'),
        (8, 'u') => Some('ü'),
        (8, 'A') => Some('Ä'),
        (8, 'O') => Some('Ö'),
        (8, 'U') => Some('Ü'),
        (10, 'a') => Some('å'),
        (10, 'u') => Some('ů'),
        (10, 'A') => Some('Å'),
        (11, 'c') => Some('ç'),
        (11, 's') => Some('ş'),
        (11, 'C') => Some('Ç'),
        (15, 'c') => Some('č'),
        (15, 'e') => Some('ě'),
        (15, 'r') => Some('ř'),
        (15, 's') => Some('š'),
        (15, 'z') => Some('ž'),
        (15, 'C') => Some('Č'),
        (15, 'S') => Some('Š'),
        (15, 'Z') => Some('Ž'),
        _ => None,
    };
    composed.unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_substitutions() {
        assert_eq!(map_g0(NationalSubset::English, 0x23), '£');
        assert_eq!(map_g0(NationalSubset::English, b'A'), 'A');
        assert_eq!(map_g0(NationalSubset::English, 0x7F), '■');
    }

    #[test]
    fn test_german_substitutions() {
        assert_eq!(map_g0(NationalSubset::German, 0x5B), 'Ä');
        assert_eq!(map_g0(NationalSubset::German, 0x7E), 'ß');
        assert_eq!(map_g0(NationalSubset::German, b'z'), 'z');
    }

    #[test]
    fn test_full_alphabets() {
        assert_eq!(map_g0(NationalSubset::Cyrillic, 0x41), 'А');
        assert_eq!(map_g0(NationalSubset::Cyrillic, 0x7E), 'ч');
        assert_eq!(map_g0(NationalSubset::Greek, 0x41), 'Α');
        assert_eq!(map_g0(NationalSubset::Hebrew, 0x60), 'א');
        assert_eq!(map_g0(NationalSubset::Cyrillic, b'1'), '1');
        assert!(NationalSubset::Greek.is_full_alphabet());
        assert!(!NationalSubset::French.is_full_alphabet());
    }

    #[test]
    fn test_designation_lookup() {
        assert_eq!(NationalSubset::from_designation(0x01), NationalSubset::German);
        assert_eq!(NationalSubset::from_designation(0x08), NationalSubset::Polish);
        assert_eq!(NationalSubset::from_designation(0x24), NationalSubset::Cyrillic);
        assert_eq!(NationalSubset::from_designation(0x37), NationalSubset::Greek);
        assert_eq!(NationalSubset::from_control_bits(0x04), NationalSubset::French);
    }

    #[test]
    fn test_g2_table_covers_all_codes() {
        assert_eq!(G2_LATIN.chars().count(), 96);
        assert_eq!(map_g2(0x23), '£');
        assert_eq!(map_g2(0x7F), '■');
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose('e', 2), 'é');
        assert_eq!(compose('s', 15), 'š');
        assert_eq!(compose('q', 2), 'q');
        assert_eq!(compose('a', 0), 'a');
    }
}
