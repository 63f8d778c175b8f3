use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::analysis::{self, PairingRule};
use crate::config::{SourceConfig, TransformConfig};
use crate::error::TrialError;
use crate::pipeline::TransformReport;
use crate::repository::TrialRepository;
use crate::schema;
use crate::source::CsvDirectorySource;
use crate::tables::TrialTables;
use crate::transform::{TransformOutput, TrialDataTransformer};

type Frames = (PyDataFrame, PyDataFrame, PyDataFrame, PyDataFrame);

fn frames(output: &TransformOutput) -> Frames {
    (
        PyDataFrame(output.treated.clone()),
        PyDataFrame(output.av2_merged.clone()),
        PyDataFrame(output.av3_merged.clone()),
        PyDataFrame(output.av4_merged.clone()),
    )
}

fn transform_config(
    strip_test_label: Option<String>,
    excluded_user: Option<String>,
) -> TransformConfig {
    let defaults = TransformConfig::default();
    TransformConfig {
        strip_test_label: strip_test_label.unwrap_or(defaults.strip_test_label),
        excluded_user: excluded_user.unwrap_or(defaults.excluded_user),
        ..defaults
    }
}

fn pairing_rule(name: &str) -> PyResult<PairingRule> {
    match name {
        "offset" => Ok(PairingRule::Offset),
        "table" => Ok(PairingRule::joint_table()),
        _ => Err(PyValueError::new_err(format!(
            "Invalid pairing: '{}'. Must be 'offset' or 'table'",
            name
        ))),
    }
}

// ── Report ──────────────────────────────────────────────────────────────────

/// Computed and skipped metrics plus skipped steps of one transformation.
#[pyclass(name = "TransformReport", frozen)]
#[derive(Clone)]
pub struct PyTransformReport {
    inner: TransformReport,
}

#[pymethods]
impl PyTransformReport {
    #[getter]
    fn computed(&self) -> Vec<String> {
        self.inner.computed.clone()
    }

    /// `(metric, missing input columns)` pairs.
    #[getter]
    fn skipped(&self) -> Vec<(String, Vec<String>)> {
        self.inner
            .skipped
            .iter()
            .map(|m| (m.metric.clone(), m.missing.clone()))
            .collect()
    }

    /// `(step, reason)` pairs.
    #[getter]
    fn skipped_steps(&self) -> Vec<(String, String)> {
        self.inner
            .skipped_steps
            .iter()
            .map(|s| (s.step.clone(), s.reason.to_string()))
            .collect()
    }

    /// `(round, keys)` pairs of plot keys seen on more than one row.
    #[getter]
    fn duplicate_keys(&self) -> Vec<(String, Vec<String>)> {
        self.inner
            .duplicate_keys
            .iter()
            .map(|d| (d.round.clone(), d.keys.clone()))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "TransformReport(computed={}, skipped={}, skipped_steps={}, duplicate_keys={})",
            self.inner.computed.len(),
            self.inner.skipped.len(),
            self.inner.skipped_steps.len(),
            self.inner.duplicate_keys.len()
        )
    }
}

// ── Transformer ─────────────────────────────────────────────────────────────

/// Stateless transformer over frames the caller already fetched.
#[pyclass]
pub struct TrialTransformer {
    inner: TrialDataTransformer,
    last_report: Option<TransformReport>,
}

#[pymethods]
impl TrialTransformer {
    #[new]
    #[pyo3(signature = (strip_test_label=None, excluded_user=None))]
    fn new(strip_test_label: Option<String>, excluded_user: Option<String>) -> Self {
        Self {
            inner: TrialDataTransformer::new(transform_config(strip_test_label, excluded_user)),
            last_report: None,
        }
    }

    /// Transform a `{table name: DataFrame}` dict.
    ///
    /// Names may carry the `df_` prefix. Returns
    /// `(treated, av2_merged, av3_merged, av4_merged)`.
    fn transform(&mut self, tables: HashMap<String, PyDataFrame>) -> PyResult<Frames> {
        let tables = TrialTables::from_map(tables.into_iter().map(|(k, v)| (k, v.0)).collect());
        let output = self.inner.transform(&tables)?;
        let result = frames(&output);
        self.last_report = Some(output.report);
        Ok(result)
    }

    /// Report of the last `transform` call.
    #[getter]
    fn report(&self) -> PyResult<PyTransformReport> {
        self.last_report
            .clone()
            .map(|inner| PyTransformReport { inner })
            .ok_or_else(|| TrialError::NotLoaded("no transform has run yet".to_string()).into())
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

/// CSV-backed repository holding the last transformation until invalidated.
#[pyclass]
pub struct TrialSession {
    repo: TrialRepository<CsvDirectorySource>,
}

#[pymethods]
impl TrialSession {
    /// `data_dir` defaults to `TRIALKIT_DATA_DIR` (or `datasets`).
    #[new]
    #[pyo3(signature = (data_dir=None, region_table=None))]
    fn new(data_dir: Option<String>, region_table: Option<String>) -> Self {
        let mut config = SourceConfig::from_env();
        if let Some(dir) = data_dir {
            config.data_dir = dir.into();
        }
        if let Some(table) = region_table {
            config.region_table = table;
        }
        Self {
            repo: TrialRepository::new(
                CsvDirectorySource::from_config(&config),
                TrialDataTransformer::default(),
            ),
        }
    }

    /// Reload every table and rebuild the cache.
    fn load(&mut self) -> PyResult<Frames> {
        Ok(frames(self.repo.load()?))
    }

    /// Cached frames, loading on first use.
    fn get(&mut self) -> PyResult<Frames> {
        Ok(frames(self.repo.get()?))
    }

    fn invalidate(&mut self) {
        self.repo.invalidate();
    }

    #[getter]
    fn is_loaded(&self) -> bool {
        self.repo.cached().is_some()
    }

    #[getter]
    fn report(&self) -> PyResult<PyTransformReport> {
        self.repo
            .cached()
            .map(|out| PyTransformReport {
                inner: out.report.clone(),
            })
            .ok_or_else(|| TrialError::NotLoaded("call load() or get() first".to_string()).into())
    }

    #[getter]
    fn data_dir(&self) -> String {
        self.repo.source().base_path().display().to_string()
    }
}

// ── Analyses ────────────────────────────────────────────────────────────────

#[pyfunction]
#[pyo3(signature = (df, pairing="offset"))]
fn joint_analysis(df: PyDataFrame, pairing: &str) -> PyResult<PyDataFrame> {
    let rule = pairing_rule(pairing)?;
    Ok(PyDataFrame(analysis::joint_analysis(&df.0, &rule)?))
}

#[pyfunction]
fn environmental_index(df: PyDataFrame) -> PyResult<PyDataFrame> {
    Ok(PyDataFrame(analysis::environmental_index(&df.0)?))
}

#[pyfunction]
fn response_ranking(df: PyDataFrame) -> PyResult<PyDataFrame> {
    Ok(PyDataFrame(analysis::response_ranking(&df.0)?))
}

#[pyfunction]
fn disease_summary(df: PyDataFrame) -> PyResult<PyDataFrame> {
    Ok(PyDataFrame(analysis::disease_summary(&df.0)?))
}

/// Returns `(locations, summary)`; `summary` is a dict of wins, ties,
/// losses and the win/loss margins.
#[pyfunction]
fn head_to_head(
    py: Python<'_>,
    df: PyDataFrame,
    head: &str,
    check: &str,
) -> PyResult<(PyDataFrame, PyObject)> {
    let h2h = analysis::head_to_head(&df.0, head, check)?;
    let s = &h2h.summary;

    let summary = pyo3::types::PyDict::new(py);
    summary.set_item("wins", s.wins)?;
    summary.set_item("ties", s.ties)?;
    summary.set_item("losses", s.losses)?;
    summary.set_item("max_win", s.max_win)?;
    summary.set_item("mean_win", s.mean_win)?;
    summary.set_item("min_loss", s.min_loss)?;
    summary.set_item("mean_loss", s.mean_loss)?;

    Ok((PyDataFrame(h2h.locations), summary.into_any().unbind()))
}

// ── Logging ─────────────────────────────────────────────────────────────────

/// Route `tracing` events to stderr, filtered by `RUST_LOG` (default `info`).
#[pyfunction]
fn init_logging() -> PyResult<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| TrialError::Config(e.to_string()).into())
}

// ── Schema constants ────────────────────────────────────────────────────────

fn add_constants(
    m: &Bound<'_, PyModule>,
    name: &str,
    constants: &[(&str, &str)],
) -> PyResult<()> {
    let sub = PyModule::new(m.py(), name)?;
    for (key, value) in constants {
        sub.add(*key, *value)?;
    }
    m.add_submodule(&sub)
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use schema::{analysis as a, cidade, derived as d, estado, fazenda, table, treatment as t};

    add_constants(
        m,
        "table",
        &[
            ("AV2_TRATAMENTO", table::AV2_TRATAMENTO),
            ("AV3_TRATAMENTO", table::AV3_TRATAMENTO),
            ("AV4_TRATAMENTO", table::AV4_TRATAMENTO),
            ("AVALIACAO", table::AVALIACAO),
            ("FAZENDA", table::FAZENDA),
            ("CIDADE", table::CIDADE),
            ("ESTADO", table::ESTADO),
            ("USERS", table::USERS),
            ("REGIOES", table::REGIOES),
        ],
    )?;

    add_constants(
        m,
        "treatment",
        &[
            ("TIPO_TESTE", t::TIPO_TESTE),
            ("AVALIACAO_REF", t::AVALIACAO_REF),
            ("FAZENDA_REF", t::FAZENDA_REF),
            ("NOME", t::NOME),
            ("INDEX_TRATAMENTO", t::INDEX_TRATAMENTO),
            ("KEY", t::KEY),
            ("DTC_RESPONSAVEL_REF", t::DTC_RESPONSAVEL_REF),
            ("HUMIDADE", t::HUMIDADE),
            ("PESO_PARCELA", t::PESO_PARCELA),
        ],
    )?;

    add_constants(
        m,
        "reference",
        &[
            ("NOME_FAZENDA", fazenda::NOME_FAZENDA),
            ("NOME_PRODUTOR", fazenda::NOME_PRODUTOR),
            ("NOME_CIDADE", cidade::NOME_CIDADE),
            ("CIDADE_SIGLA_ESTADO", cidade::CIDADE_SIGLA_ESTADO),
            ("ESTADO", estado::ESTADO),
            ("SIGLA_ESTADO", estado::SIGLA_ESTADO),
            ("DISPLAY_NAME", schema::users::DISPLAY_NAME),
        ],
    )?;

    add_constants(
        m,
        "derived",
        &[
            ("CORR_PMG", d::CORR_PMG),
            ("AREA_PARCELA_M2", d::AREA_PARCELA_M2),
            ("PROD_KG_HA", d::PROD_KG_HA),
            ("PROD_KG_HA_CORR", d::PROD_KG_HA_CORR),
            ("PROD_SC_HA_CORR", d::PROD_SC_HA_CORR),
            ("NUM_PLANTAS_HA", d::NUM_PLANTAS_HA),
            ("PERC_TOTAL", d::PERC_TOTAL),
            ("MEDIA_ALT_M", d::MEDIA_ALT_M),
            ("MEDIA_AIE_M", d::MEDIA_AIE_M),
            ("PLANTIO", d::PLANTIO),
            ("COLHEITA", d::COLHEITA),
            ("CICLO_DIAS", d::CICLO_DIAS),
            ("FLOR_FEM_DIAS", d::FLOR_FEM_DIAS),
            ("FLOR_MASC_DIAS", d::FLOR_MASC_DIAS),
        ],
    )?;

    add_constants(
        m,
        "analysis",
        &[
            ("INDEX_AGRUPADO", a::INDEX_AGRUPADO),
            ("MEDIA_LOCAL_SC_HA", a::MEDIA_LOCAL_SC_HA),
            ("PROD_MAX_FAZENDA", a::PROD_MAX_FAZENDA),
            ("DIFF_TO_MAX", a::DIFF_TO_MAX),
            ("PROD_REL_PCT", a::PROD_REL_PCT),
            ("RANKING", a::RANKING),
            ("DIFF_SC_HA", a::DIFF_SC_HA),
        ],
    )?;

    let disease: Vec<(&str, &str)> = schema::disease::ALL.iter().map(|c| (*c, *c)).collect();
    add_constants(m, "disease", &disease)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<TrialTransformer>()?;
    m.add_class::<TrialSession>()?;
    m.add_class::<PyTransformReport>()?;
    m.add_function(wrap_pyfunction!(joint_analysis, m)?)?;
    m.add_function(wrap_pyfunction!(environmental_index, m)?)?;
    m.add_function(wrap_pyfunction!(response_ranking, m)?)?;
    m.add_function(wrap_pyfunction!(disease_summary, m)?)?;
    m.add_function(wrap_pyfunction!(head_to_head, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
