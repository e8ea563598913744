//! Procedural naming for settlements, realms, religions and cultures.
//!
//! Names are built from a small syllabary so they read as one language
//! across the whole atlas. Every function draws from the caller's generator,
//! so a name is fixed by the seed of whatever owns it.

use rand::Rng;

const CONSONANTS: &[&str] = &[
    "b", "c", "d", "f", "g", "h", "j", "k", "l", "m", "n", "p", "r", "s", "t", "v", "w", "z",
];
const VOWELS: &[&str] = &["a", "e", "i", "o", "u"];
const CLUSTERS: &[&str] = &[
    "br", "ch", "dr", "fl", "gr", "sh", "sk", "sl", "sp", "st", "th", "tr", "tw", "wh",
];

const REALM_SUFFIXES: &[&str] = &["ia", "land", "shire", "stan", "mark", "reach"];

const RELIGION_TEMPLATES: &[&str] = &[
    "The Cult of {}",
    "The Children of {}",
    "The Order of {}",
    "The Faith of {}",
    "The Path of {}",
    "The Keepers of {}",
    "The Blessing of {}",
    "The Temple of {}",
    "The Covenant of {}",
    "The Way of {}",
    "The Disciples of {}",
    "The Communion of {}",
];

const CULTURE_TEMPLATES: &[&str] = &[
    "Tradition of the {}",
    "People of the {}",
    "Sons of the {}",
    "Heirs of the {}",
    "Wardens of the {}",
    "Children of the {}",
    "Blood of the {}",
    "Alliance of the {}",
];

const CULTURE_THEMES: &[&str] = &[
    "Mountains", "Forests", "Seas", "Steppe", "Dawn", "Dusk", "Storm", "Light", "Shadow",
    "Ancients", "Dragons", "Eagles", "Wolves", "Ravens", "Bears", "Stag", "Stone", "Flame",
    "Rivers", "Winds",
];

pub struct NameGenerator;

impl NameGenerator {
    /// Settlement name of 2 to 4 syllables ("Drakemo", "Fisuna").
    pub fn city_name(rng: &mut impl Rng) -> String {
        let syllables = rng.gen_range(2..=4);
        let mut name = String::new();
        for i in 0..syllables {
            if i == 0 && rng.gen_bool(0.3) {
                name.push_str(pick(rng, CLUSTERS));
            } else if rng.gen_bool(0.7) {
                name.push_str(pick(rng, CONSONANTS));
            }
            name.push_str(pick(rng, VOWELS));
            if rng.gen_bool(0.3) {
                name.push_str(pick(rng, CONSONANTS));
            }
        }
        capitalize(&name)
    }

    /// Realm name: a short stem plus a realm suffix ("Grevoland").
    pub fn country_name(rng: &mut impl Rng) -> String {
        let syllables = rng.gen_range(2..=3);
        let mut name = String::new();
        for i in 0..syllables {
            if i == 0 && rng.gen_bool(0.4) {
                name.push_str(pick(rng, CLUSTERS));
            } else {
                name.push_str(pick(rng, CONSONANTS));
            }
            name.push_str(pick(rng, VOWELS));
        }
        name.push_str(pick(rng, REALM_SUFFIXES));
        capitalize(&name)
    }

    /// Religion name built around its deity theme.
    pub fn religion_name(deity_theme: &str, rng: &mut impl Rng) -> String {
        pick(rng, RELIGION_TEMPLATES).replace("{}", deity_theme)
    }

    pub fn culture_name(rng: &mut impl Rng) -> String {
        let template = pick(rng, CULTURE_TEMPLATES);
        template.replace("{}", pick(rng, CULTURE_THEMES))
    }

    /// Name for a splinter faith of `parent`.
    pub fn schism_name(parent: &str, rng: &mut impl Rng) -> String {
        let prefix = pick(rng, &["Reformed", "True", "Old", "Free", "Hidden", "Orthodox"]);
        let stripped = parent.strip_prefix("The ").unwrap_or(parent);
        format!("The {} {}", prefix, stripped)
    }
}

fn pick<'a>(rng: &mut impl Rng, options: &[&'a str]) -> &'a str {
    options[rng.gen_range(0..options.len())]
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
