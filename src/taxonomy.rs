// src/taxonomy.rs
//! Declarative topic and geo dictionaries. Matching is case-insensitive
//! substring over the caller-built haystack; results preserve declaration
//! order and are deduplicated by label.

use once_cell::sync::Lazy;
use std::collections::HashSet;

pub struct DictEntry {
    pub label: &'static str,
    pub keywords: &'static [&'static str],
}

pub static TOPICS: &[DictEntry] = &[
    DictEntry {
        label: "Conflict/Military",
        keywords: &[
            "military", "missile", "airstrike", "air strike", "troops", "artillery",
            "invasion", "ceasefire", "shelling", "offensive", "drone strike", "frontline",
        ],
    },
    DictEntry {
        label: "Cyber/Security",
        keywords: &[
            "cyber", "ransomware", "malware", "hacker", "hacked", "data breach",
            "phishing", "zero-day", "botnet", "ddos", "vulnerability",
        ],
    },
    DictEntry {
        label: "Space/EO",
        keywords: &[
            "satellite", "rocket", "orbit", "spacecraft", "space station",
            "earth observation", "spaceport", "launch pad", "reentry",
        ],
    },
    DictEntry {
        label: "PRC/China",
        keywords: &[
            "china", "chinese", "beijing", "prc", "taiwan strait", "xi jinping", "pla ",
        ],
    },
    DictEntry {
        label: "Russia/Ukraine",
        keywords: &[
            "russia", "russian", "kremlin", "moscow", "ukraine", "ukrainian", "kyiv", "putin",
        ],
    },
    DictEntry {
        label: "Nuclear/WMD",
        keywords: &[
            "nuclear", "uranium", "enrichment", "warhead", "ballistic", "icbm",
            "chemical weapons", "nonproliferation",
        ],
    },
    DictEntry {
        label: "Diplomacy",
        keywords: &[
            "summit", "treaty", "diplomat", "negotiation", "bilateral",
            "foreign minister", "united nations", "security council", "ambassador",
        ],
    },
    DictEntry {
        label: "Economy/Sanctions",
        keywords: &[
            "sanction", "tariff", "embargo", "export controls", "inflation",
            "central bank", "trade deal", "supply chain", "debt default",
        ],
    },
    DictEntry {
        label: "Energy",
        keywords: &[
            "oil price", "crude", "pipeline", "opec", "lng", "refinery",
            "power grid", "blackout", "energy",
        ],
    },
    DictEntry {
        label: "Terrorism",
        keywords: &[
            "terror", "bombing", "extremist", "hostage", "insurgent", "suicide attack",
        ],
    },
    DictEntry {
        label: "Intelligence/Espionage",
        keywords: &[
            "espionage", "spy", "intelligence agency", "surveillance", "covert",
            "counterintelligence", "classified", "defector",
        ],
    },
    DictEntry {
        label: "Maritime",
        keywords: &[
            "navy", "naval", "warship", "submarine", "strait", "maritime",
            "coast guard", "tanker", "frigate", "blockade",
        ],
    },
    DictEntry {
        label: "Aviation",
        keywords: &[
            "aircraft", "fighter jet", "airspace", "air force", "bomber",
            "helicopter", "airbase", "no-fly",
        ],
    },
    DictEntry {
        label: "Elections/Politics",
        keywords: &[
            "election", "ballot", "parliament", "coalition", "referendum",
            "coup", "impeach", "opposition leader",
        ],
    },
    DictEntry {
        label: "Health/Bio",
        keywords: &[
            "outbreak", "pandemic", "virus", "pathogen", "biosecurity",
            "vaccine", "epidemic", "quarantine",
        ],
    },
    DictEntry {
        label: "AI/Tech",
        keywords: &[
            "artificial intelligence", " ai ", "semiconductor", "chip export",
            "quantum", "autonomous weapon", "deepfake",
        ],
    },
    DictEntry {
        label: "Climate/Disaster",
        keywords: &[
            "earthquake", "hurricane", "flood", "wildfire", "drought",
            "typhoon", "cyclone", "volcano", "climate",
        ],
    },
];

pub static GEOS: &[DictEntry] = &[
    DictEntry {
        label: "Europe",
        keywords: &[
            "europe", "european", "germany", "berlin", "france", "paris", "poland",
            "warsaw", "britain", "london", "italy", "spain", "nato", "brussels",
            "ukraine", "kyiv", "russia", "moscow", "balkans", "baltics",
        ],
    },
    DictEntry {
        label: "Middle East",
        keywords: &[
            "israel", "gaza", "jerusalem", "iran", "tehran", "saudi", "riyadh",
            "syria", "iraq", "baghdad", "yemen", "lebanon", "beirut", "hezbollah",
            "houthi", "qatar", "emirates", "middle east",
        ],
    },
    DictEntry {
        label: "Asia",
        keywords: &[
            "china", "beijing", "taiwan", "taipei", "japan", "tokyo", "korea",
            "seoul", "pyongyang", "india", "delhi", "pakistan", "islamabad",
            "philippines", "manila", "vietnam", "indonesia", "jakarta",
            "myanmar", "asia",
        ],
    },
    DictEntry {
        label: "Africa",
        keywords: &[
            "africa", "nigeria", "ethiopia", "sudan", "sahel", "kenya", "nairobi",
            "congo", "mali", "somalia", "libya", "egypt", "cairo", "niger",
        ],
    },
    DictEntry {
        label: "Americas",
        keywords: &[
            "united states", "washington", "u.s.", "pentagon", "white house",
            "canada", "ottawa", "mexico", "brazil", "brasilia", "venezuela",
            "caracas", "colombia", "argentina", "haiti", "america",
        ],
    },
    DictEntry {
        label: "Oceania",
        keywords: &[
            "oceania", "australia", "canberra", "new zealand", "wellington",
            "pacific islands", "papua", "fiji", "solomon islands",
        ],
    },
    DictEntry {
        label: "Arctic",
        keywords: &[
            "arctic", "svalbard", "polar", "northern sea route", "greenland", "barents",
        ],
    },
];

/// Labels whose keywords match the haystack, in declaration order.
pub fn match_labels(dict: &[DictEntry], haystack: &str) -> Vec<String> {
    let hay = haystack.to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in dict {
        if entry.keywords.iter().any(|kw| hay.contains(kw)) && seen.insert(entry.label) {
            out.push(entry.label.to_string());
        }
    }
    out
}

pub fn topic_labels() -> Vec<&'static str> {
    TOPICS.iter().map(|e| e.label).collect()
}

pub fn geo_labels() -> Vec<&'static str> {
    GEOS.iter().map(|e| e.label).collect()
}

/// Single-word forms of every geo keyword. The clusterer drops these from
/// title token sets: place names dominate rewritten headlines without
/// distinguishing the underlying story.
pub static GEO_TOKEN_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set = HashSet::new();
    for entry in GEOS {
        for kw in entry.keywords {
            for word in kw.split_whitespace() {
                set.insert(word);
            }
        }
    }
    set
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satellite_headline_matches_expected_topics() {
        let tags = match_labels(TOPICS, "China launches new satellite ");
        assert!(tags.contains(&"Space/EO".to_string()));
        assert!(tags.contains(&"PRC/China".to_string()));
    }

    #[test]
    fn geo_match_covers_capital_aliases() {
        let geos = match_labels(GEOS, "Beijing Launches New Satellite for Observation");
        assert_eq!(geos, vec!["Asia".to_string()]);
    }

    #[test]
    fn declaration_order_is_preserved() {
        let tags = match_labels(TOPICS, "cyber attack disrupts military networks with missile response");
        assert_eq!(tags[0], "Conflict/Military");
        assert_eq!(tags[1], "Cyber/Security");
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(match_labels(TOPICS, "gardening tips for spring").is_empty());
    }

    #[test]
    fn geo_token_set_contains_split_words() {
        assert!(GEO_TOKEN_SET.contains("beijing"));
        assert!(GEO_TOKEN_SET.contains("united"));
        assert!(GEO_TOKEN_SET.contains("states"));
    }
}
