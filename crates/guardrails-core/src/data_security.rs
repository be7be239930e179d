use guardrails_shared::{
    AnonymizationConfig, AnonymizationMethod, DataSecurityEntityType, Direction, RecognitionConfig, RiskLevel,
};
use md5::{Digest as Md5Digest, Md5};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct EntityTypeRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    entity_type: String,
    display_name: String,
    category: RiskLevel,
    recognition_config: serde_json::Value,
    anonymization_method: AnonymizationMethod,
    anonymization_config: serde_json::Value,
    is_active: bool,
    is_global: bool,
}

impl TryFrom<EntityTypeRow> for DataSecurityEntityType {
    type Error = serde_json::Error;

    fn try_from(r: EntityTypeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            entity_type: r.entity_type,
            display_name: r.display_name,
            category: r.category,
            recognition_config: serde_json::from_value::<RecognitionConfig>(r.recognition_config)?,
            anonymization_method: r.anonymization_method,
            anonymization_config: serde_json::from_value::<AnonymizationConfig>(r.anonymization_config)?,
            is_active: r.is_active,
            is_global: r.is_global,
        })
    }
}

/// Loads the entity types visible to `tenant_id`: its own plus the global ones
/// (`tenant_id IS NULL`), filtered to active rows (§3 invariant: globals are
/// read-visible to all tenants). Not cached — entity types aren't one of the four
/// hot caches in §4.5, so this runs once per inspection call.
pub async fn load_entity_types(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<Vec<DataSecurityEntityType>> {
    let rows = sqlx::query_as::<_, EntityTypeRow>(
        "SELECT id, tenant_id, entity_type, display_name, category, recognition_config,
                anonymization_method, anonymization_config, is_active, is_global
         FROM data_security_entity_types
         WHERE is_active = true AND (tenant_id = $1 OR tenant_id IS NULL)",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| match DataSecurityEntityType::try_from(r) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(error = %e, "failed to deserialize data security entity type, skipping");
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct DetectedEntity {
    pub entity_type: String,
    pub display_name: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub risk_level: RiskLevel,
    pub anonymization_method: AnonymizationMethod,
    pub anonymization_config: AnonymizationConfig,
}

#[derive(Debug, Clone, Default)]
pub struct DataSecurityResult {
    pub risk_level: RiskLevel,
    pub categories: Vec<String>,
    pub detected_entities: Vec<DetectedEntity>,
    pub anonymized_text: Option<String>,
}

/// Regex-based PII/data-leak scanner and anonymizer (§4.1 step 3), grounded on
/// `data_security_service.py`.
pub struct DataSecurityEngine;

impl DataSecurityEngine {
    /// Scans `text` against every entity type applicable to `direction`, returning
    /// the max matched risk level, the display-name categories hit, the raw matches
    /// (for detection-record bookkeeping), and — for `Direction::Input` with any
    /// match — a de-identified version of the text (§4.1 step 3).
    pub fn detect(
        text: &str,
        entity_types: &[DataSecurityEntityType],
        direction: Direction,
    ) -> DataSecurityResult {
        let mut entities = Vec::new();

        for entity_type in entity_types {
            if !entity_type.is_active {
                continue;
            }
            let applies = match direction {
                Direction::Input => entity_type.recognition_config.check_input,
                Direction::Output => entity_type.recognition_config.check_output,
            };
            if !applies {
                continue;
            }

            match Regex::new(&entity_type.recognition_config.pattern) {
                Ok(re) => {
                    for m in re.find_iter(text) {
                        entities.push(DetectedEntity {
                            entity_type: entity_type.entity_type.clone(),
                            display_name: entity_type.display_name.clone(),
                            start: m.start(),
                            end: m.end(),
                            text: m.as_str().to_string(),
                            risk_level: entity_type.category,
                            anonymization_method: entity_type.anonymization_method,
                            anonymization_config: entity_type.anonymization_config.clone(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(entity_type = %entity_type.entity_type, error = %e, "entity regex compile failed, skipping");
                }
            }
        }

        if entities.is_empty() {
            return DataSecurityResult::default();
        }

        let risk_level = RiskLevel::max_of(entities.iter().map(|e| e.risk_level));
        let mut categories: Vec<String> = entities.iter().map(|e| e.display_name.clone()).collect();
        categories.sort();
        categories.dedup();

        let anonymized_text = matches!(direction, Direction::Input).then(|| Self::anonymize(text, &entities));

        DataSecurityResult {
            risk_level,
            categories,
            detected_entities: entities,
            anonymized_text,
        }
    }

    /// Applies each entity's anonymization method back-to-front by start offset so
    /// earlier offsets remain valid as later (higher-offset) replacements are applied.
    /// `start`/`end` are the **byte** offsets `regex::Match` returns, so this must
    /// operate on the `&str`'s byte ranges directly rather than a `Vec<char>` index
    /// (which would misalign under any multibyte text preceding a match).
    fn anonymize(text: &str, entities: &[DetectedEntity]) -> String {
        let mut sorted: Vec<&DetectedEntity> = entities.iter().collect();
        sorted.sort_by(|a, b| b.start.cmp(&a.start));

        let mut result = text.to_string();
        for entity in sorted {
            let replacement = Self::anonymize_one(entity);
            result.replace_range(entity.start..entity.end, &replacement);
        }
        result
    }

    fn anonymize_one(entity: &DetectedEntity) -> String {
        match entity.anonymization_method {
            AnonymizationMethod::Replace => entity
                .anonymization_config
                .placeholder
                .clone()
                .unwrap_or_else(|| format!("<{}>", entity.entity_type)),
            AnonymizationMethod::Mask => Self::mask(
                &entity.text,
                entity
                    .anonymization_config
                    .mask_char
                    .as_deref()
                    .unwrap_or("*"),
                entity.anonymization_config.keep_prefix.unwrap_or(0),
                entity.anonymization_config.keep_suffix.unwrap_or(0),
            ),
            AnonymizationMethod::Hash => Self::hash(&entity.text),
            AnonymizationMethod::Encrypt => Self::encrypt_placeholder(&entity.text),
            AnonymizationMethod::Shuffle => Self::shuffle(&entity.text),
            AnonymizationMethod::Random => Self::random_replacement(&entity.text),
        }
    }

    fn mask(text: &str, mask_char: &str, keep_prefix: usize, keep_suffix: usize) -> String {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if keep_prefix + keep_suffix >= len {
            return text.to_string();
        }
        let mask_char = mask_char.chars().next().unwrap_or('*');
        let middle_len = len - keep_prefix - keep_suffix;
        let prefix: String = chars[..keep_prefix].iter().collect();
        let suffix: String = chars[len - keep_suffix..].iter().collect();
        format!("{prefix}{}{suffix}", mask_char.to_string().repeat(middle_len))
    }

    fn hash(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    fn encrypt_placeholder(text: &str) -> String {
        let digest = Md5::digest(text.as_bytes());
        format!("<ENCRYPTED_{}>", &hex::encode(digest)[..8])
    }

    fn shuffle(text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        chars.shuffle(&mut rand::thread_rng());
        chars.into_iter().collect()
    }

    /// Randomizes value while preserving each character's class (digit/upper/lower).
    fn random_replacement(text: &str) -> String {
        let mut rng = rand::thread_rng();
        text.chars()
            .map(|c| {
                if c.is_ascii_digit() {
                    std::char::from_digit(rng.gen_range(0..10), 10).unwrap()
                } else if c.is_ascii_uppercase() {
                    rng.gen_range(b'A'..=b'Z') as char
                } else if c.is_ascii_lowercase() {
                    rng.gen_range(b'a'..=b'z') as char
                } else {
                    c
                }
            })
            .collect()
    }
}

/// The six default entity types created for a new tenant, with the exact patterns
/// and mask configuration from `create_user_default_entity_types` in
/// `data_security_service.py`.
pub fn default_entity_types(tenant_id: Uuid) -> Vec<DataSecurityEntityType> {
    let mk = |entity_type: &str,
              display_name: &str,
              pattern: &str,
              category: RiskLevel,
              method: AnonymizationMethod,
              config: AnonymizationConfig| DataSecurityEntityType {
        id: Uuid::new_v4(),
        tenant_id: Some(tenant_id),
        entity_type: entity_type.to_string(),
        display_name: display_name.to_string(),
        category,
        recognition_config: guardrails_shared::RecognitionConfig {
            pattern: pattern.to_string(),
            check_input: true,
            check_output: true,
        },
        anonymization_method: method,
        anonymization_config: config,
        is_active: true,
        is_global: false,
    };

    vec![
        mk(
            "ID_CARD_NUMBER",
            "身份证号",
            r"[1-8]\d{5}(19|20)\d{2}((0[1-9])|(1[0-2]))((0[1-9])|([12]\d)|(3[01]))\d{3}[\dxX]",
            RiskLevel::High,
            AnonymizationMethod::Mask,
            AnonymizationConfig {
                keep_prefix: Some(3),
                keep_suffix: Some(4),
                ..Default::default()
            },
        ),
        mk(
            "PHONE_NUMBER",
            "手机号",
            r"1[3-9]\d{9}",
            RiskLevel::Medium,
            AnonymizationMethod::Mask,
            AnonymizationConfig {
                keep_prefix: Some(3),
                keep_suffix: Some(4),
                ..Default::default()
            },
        ),
        mk(
            "EMAIL",
            "邮箱",
            r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            RiskLevel::Low,
            AnonymizationMethod::Mask,
            AnonymizationConfig {
                keep_prefix: Some(2),
                keep_suffix: Some(0),
                ..Default::default()
            },
        ),
        mk(
            "BANK_CARD_NUMBER",
            "银行卡号",
            r"\d{16,19}",
            RiskLevel::High,
            AnonymizationMethod::Mask,
            AnonymizationConfig {
                keep_prefix: Some(4),
                keep_suffix: Some(4),
                ..Default::default()
            },
        ),
        mk(
            "PASSPORT_NUMBER",
            "护照号",
            r"[EGP]\d{8}",
            RiskLevel::High,
            AnonymizationMethod::Mask,
            AnonymizationConfig {
                keep_prefix: Some(1),
                keep_suffix: Some(2),
                ..Default::default()
            },
        ),
        mk(
            "IP_ADDRESS",
            "IP地址",
            r"(?:\d{1,3}\.){3}\d{1,3}",
            RiskLevel::Low,
            AnonymizationMethod::Replace,
            AnonymizationConfig {
                placeholder: Some("<IP_ADDRESS>".to_string()),
                ..Default::default()
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_prefix_and_suffix() {
        let masked = DataSecurityEngine::mask("13812345678", "*", 3, 4);
        assert_eq!(masked, "138****5678");
    }

    #[test]
    fn phone_number_detected_and_anonymized_preserves_no_original() {
        let entity_types = default_entity_types(Uuid::new_v4());
        let text = "我的电话是13812345678，请联系我";
        let result = DataSecurityEngine::detect(text, &entity_types, Direction::Input);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        let anonymized = result.anonymized_text.unwrap();
        assert!(!anonymized.contains("13812345678"));
    }

    #[test]
    fn phone_number_after_long_multibyte_prefix_is_fully_anonymized() {
        let entity_types = default_entity_types(Uuid::new_v4());
        let text = format!("{}13812345678", "中文前缀".repeat(20));
        let result = DataSecurityEngine::detect(&text, &entity_types, Direction::Input);
        let anonymized = result.anonymized_text.unwrap();
        assert!(!anonymized.contains("13812345678"));
    }

    #[test]
    fn no_match_yields_no_risk() {
        let entity_types = default_entity_types(Uuid::new_v4());
        let result = DataSecurityEngine::detect("hello world", &entity_types, Direction::Input);
        assert_eq!(result.risk_level, RiskLevel::NoRisk);
        assert!(result.anonymized_text.is_none());
    }

    #[test]
    fn shuffle_preserves_character_multiset() {
        let mut shuffled: Vec<char> = DataSecurityEngine::shuffle("abcdef").chars().collect();
        let mut original: Vec<char> = "abcdef".chars().collect();
        shuffled.sort_unstable();
        original.sort_unstable();
        assert_eq!(shuffled, original);
    }
}
