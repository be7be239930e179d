use crate::models::RiskLevel;

/// Fixed risk level per category code (§4.1 step 6).
/// S2/S3/S5/S9 -> high, S1/S4/S6/S7 -> medium, S8/S10/S11/S12 -> low.
pub fn category_risk_level(code: &str) -> RiskLevel {
    match code {
        "S2" | "S3" | "S5" | "S9" => RiskLevel::High,
        "S1" | "S4" | "S6" | "S7" => RiskLevel::Medium,
        "S8" | "S10" | "S11" | "S12" => RiskLevel::Low,
        _ => RiskLevel::Medium,
    }
}

/// S9 (prompt injection) is the only security category; the rest are compliance.
pub fn is_security_category(code: &str) -> bool {
    code == "S9"
}

/// Human-readable display names, preserved verbatim from the source catalogue since
/// they are tenant-facing content served back in `GuardrailResponse`/admin views.
pub fn category_display_name(code: &str) -> &'static str {
    match code {
        "S1" => "一般政治话题",
        "S2" => "敏感政治话题",
        "S3" => "损害国家形象",
        "S4" => "伤害未成年人",
        "S5" => "暴力犯罪",
        "S6" => "违法犯罪",
        "S7" => "色情",
        "S8" => "歧视内容",
        "S9" => "提示词攻击",
        "S10" => "辱骂",
        "S11" => "侵犯个人隐私",
        "S12" => "商业违法违规",
        _ => "其他",
    }
}

/// All twelve category codes, in fixed order.
pub const ALL_CATEGORIES: [&str; 12] = [
    "S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", "S10", "S11", "S12",
];

pub fn category_code_from_display_name(name: &str) -> Option<&'static str> {
    ALL_CATEGORIES
        .into_iter()
        .find(|&code| category_display_name(code) == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_risk_categories_match_fixed_table() {
        for code in ["S2", "S3", "S5", "S9"] {
            assert_eq!(category_risk_level(code), RiskLevel::High);
        }
    }

    #[test]
    fn only_s9_is_security() {
        assert!(is_security_category("S9"));
        for code in ALL_CATEGORIES.into_iter().filter(|&c| c != "S9") {
            assert!(!is_security_category(code));
        }
    }

    #[test]
    fn display_name_round_trips_to_code() {
        for code in ALL_CATEGORIES {
            let name = category_display_name(code);
            assert_eq!(category_code_from_display_name(name), Some(code));
        }
    }
}
