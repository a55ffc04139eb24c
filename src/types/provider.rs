//! Insurer identity and per-insurer extraction rules.
//!
//! Provider quirks live here as data: supporting a new insurer means adding a
//! row to [`PROVIDERS`], not a branch in the normalizer.

/// Where an insurer reports the coverage amount of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumInsuredRule {
    /// A dedicated sum-insured attribute (`SI`, `sumInsured`).
    Field,
    /// The amount of the cover line whose name contains the given text
    /// (matched case-insensitively).
    CoverLine(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Display name, also the value matched by the insurer filter.
    pub name: &'static str,
    /// Lowercase fragments recognised inside quote keys such as `reliance_Gold`.
    pub key_aliases: &'static [&'static str],
    pub logo: &'static str,
    pub sum_insured: SumInsuredRule,
    /// Whether the product code is carried through for checkout.
    pub uses_plan_code: bool,
}

pub const DEFAULT_LOGO: &str = "/assets/insurers/default.png";

pub const OTHER_PROVIDER: ProviderProfile = ProviderProfile {
    name: "Other",
    key_aliases: &[],
    logo: DEFAULT_LOGO,
    sum_insured: SumInsuredRule::Field,
    uses_plan_code: false,
};

pub const PROVIDERS: &[ProviderProfile] = &[
    ProviderProfile {
        name: "Reliance General",
        key_aliases: &["reliance"],
        logo: "/assets/insurers/reliance.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: true,
    },
    ProviderProfile {
        name: "Go Digit",
        key_aliases: &["godigit", "digit"],
        logo: "/assets/insurers/godigit.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "Care Health",
        key_aliases: &["care"],
        logo: "/assets/insurers/care.png",
        sum_insured: SumInsuredRule::CoverLine("medical expenses"),
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "TATA AIG",
        key_aliases: &["tataaig", "tata"],
        logo: "/assets/insurers/tata-aig.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "Bajaj Allianz",
        key_aliases: &["bajaj"],
        logo: "/assets/insurers/bajaj.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "ICICI Lombard",
        key_aliases: &["icici"],
        logo: "/assets/insurers/icici.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "HDFC ERGO",
        key_aliases: &["hdfc"],
        logo: "/assets/insurers/hdfc-ergo.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "Niva Bupa",
        key_aliases: &["niva", "bupa"],
        logo: "/assets/insurers/niva-bupa.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "Future Generali",
        key_aliases: &["futuregenerali", "generali"],
        logo: "/assets/insurers/future-generali.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
    ProviderProfile {
        name: "IFFCO Tokio",
        key_aliases: &["iffco"],
        logo: "/assets/insurers/iffco-tokio.png",
        sum_insured: SumInsuredRule::Field,
        uses_plan_code: false,
    },
];

/// Looks up an insurer by the name a provider reported, ignoring case,
/// spacing and punctuation.
pub fn profile_by_name(name: &str) -> Option<&'static ProviderProfile> {
    let wanted = compact(name);
    if wanted.is_empty() {
        return None;
    }
    PROVIDERS.iter().find(|p| {
        compact(p.name) == wanted || p.key_aliases.iter().any(|alias| wanted.contains(alias))
    })
}

/// Infers the insurer from a quote key such as `reliance_Student_Basic`.
pub fn profile_for_key(key: &str) -> Option<&'static ProviderProfile> {
    let key = compact(key);
    PROVIDERS
        .iter()
        .find(|p| p.key_aliases.iter().any(|alias| key.contains(alias)))
}

/// Logo asset for a provider display name, or the default logo.
pub fn logo_for(provider: &str) -> &'static str {
    profile_by_name(provider).map_or(DEFAULT_LOGO, |p| p.logo)
}

fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_for_key_substring_match() {
        assert_eq!(profile_for_key("reliance_Student_Basic").unwrap().name, "Reliance General");
        assert_eq!(profile_for_key("GODIGIT_Silver").unwrap().name, "Go Digit");
        assert_eq!(profile_for_key("tata_aig_Platinum").unwrap().name, "TATA AIG");
        assert!(profile_for_key("planA").is_none());
    }

    #[test]
    fn test_profile_by_name_ignores_case_and_spacing() {
        assert_eq!(profile_by_name("hdfc ergo").unwrap().name, "HDFC ERGO");
        assert_eq!(profile_by_name("Care Health Insurance").unwrap().name, "Care Health");
        assert!(profile_by_name("").is_none());
        assert!(profile_by_name("Acme Mutual").is_none());
    }

    #[test]
    fn test_logo_falls_back_to_default() {
        assert_eq!(logo_for("Go Digit"), "/assets/insurers/godigit.png");
        assert_eq!(logo_for("Acme Mutual"), DEFAULT_LOGO);
    }
}
