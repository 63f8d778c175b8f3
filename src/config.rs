use std::env;
use std::path::PathBuf;

use crate::schema::table;

const DEFAULT_DATA_DIR: &str = "datasets";

/// Business constants applied by the transformer.
///
/// `Default` carries the values the trial programme runs with; they are
/// fixed business rules, not user settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    /// Only rows whose `tipoTeste` equals this label are kept.
    pub strip_test_label: String,
    /// Rows whose technician `displayName` equals this are dropped.
    pub excluded_user: String,
    /// Reference moisture (%) for kernel weight and yield correction.
    pub standard_moisture: f64,
    /// Weight of one sack in kg.
    pub sack_weight_kg: f64,
    /// Heights above this are taken to be centimetres.
    pub height_cm_threshold: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            strip_test_label: "Faixa".to_string(),
            excluded_user: "raullanconi".to_string(),
            standard_moisture: 13.5,
            sack_weight_kg: 60.0,
            height_cm_threshold: 10.0,
        }
    }
}

/// Where the CSV table source reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub data_dir: PathBuf,
    /// File stem of the municipality → region lookup (`.xlsx`, or a `.csv` export).
    pub region_table: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            region_table: table::REGIOES.to_string(),
        }
    }
}

impl SourceConfig {
    /// Read `TRIALKIT_DATA_DIR` and `TRIALKIT_REGION_TABLE`, honouring a `.env` file.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            data_dir: env::var("TRIALKIT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            region_table: env::var("TRIALKIT_REGION_TABLE").unwrap_or(defaults.region_table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_business_rules() {
        let cfg = TransformConfig::default();
        assert_eq!(cfg.strip_test_label, "Faixa");
        assert_eq!(cfg.excluded_user, "raullanconi");
        assert_eq!(cfg.standard_moisture, 13.5);
        assert_eq!(cfg.sack_weight_kg, 60.0);
    }

    #[test]
    fn default_source_points_at_datasets() {
        let cfg = SourceConfig::default();
        assert_eq!(cfg.data_dir, PathBuf::from("datasets"));
        assert_eq!(cfg.region_table, "base_municipios_regioes_soja_milho");
    }

    #[test]
    fn environment_overrides_source_defaults() {
        env::set_var("TRIALKIT_REGION_TABLE", "regioes_2025");

        let cfg = SourceConfig::from_env();

        env::remove_var("TRIALKIT_REGION_TABLE");
        assert_eq!(cfg.region_table, "regioes_2025");
    }
}
