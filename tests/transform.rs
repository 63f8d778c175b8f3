use corn_trialkit::frame::{f64_values, text_values};
use corn_trialkit::schema::{derived, replicate};
use corn_trialkit::{DuplicateKeys, SkipReason, TrialDataTransformer, TrialTables};
use polars::df;
use polars::prelude::*;
use pretty_assertions::assert_eq;

fn with_replicates(mut df: DataFrame, value: &str) -> DataFrame {
    let height = df.height();
    for (_, suffix) in replicate::GROUPS {
        for name in replicate::columns(suffix) {
            df.with_column(Column::new(name.into(), vec![value; height]))
                .unwrap();
        }
    }
    df
}

fn av4() -> DataFrame {
    let df = df!(
        "uuid" => ["P1", "P2", "P3"],
        "tipoTeste" => ["Faixa", "Faixa", "Parcela"],
        "avaliacaoRef" => ["A1", "A1", "A1"],
        "fazendaRef" => ["STALE", "STALE", "STALE"],
        "nome" => ["AG 8480", "DKB 255", "AG 8480"],
        "indexTratamento" => ["101", "102", "103"],
        "dtcResponsavelRef" => [Some("U1"), Some("U2"), Some("U1")],
        "numeroLinhas" => ["4", "4", "4"],
        "comprimentoLinha" => ["5", "5", "5"],
        "espacamento" => ["0,5", "0,5", "0,5"],
        "pesoParcela" => ["9", "9", "9"],
        "humidade" => ["13.5", "13.5", "13.5"],
        "dataPlantioMilho" => ["1727740800", "1727740800", "1727740800"],
        "dataColheitaMilho" => ["1739577600", "1739577600", "1739577600"],
        "dataFlorescimentoFeminina" => ["1733011200", "1733011200", "1733011200"],
        "dataFlorescimentoMasculina" => ["1732924800", "1732924800", "1732924800"]
    )
    .unwrap();
    with_replicates(df, "20")
}

fn av3() -> DataFrame {
    df!(
        "uuid" => ["Q1", "Q2"],
        "tipoTeste" => ["Faixa", "Faixa"],
        "avaliacaoRef" => ["A1", "A1"],
        "nome" => ["AG 8480", "DKB 255"],
        "indexTratamento" => ["101", "102"],
        "manchaBranca" => ["7", "5"]
    )
    .unwrap()
}

fn tables() -> TrialTables {
    TrialTables {
        av4: Some(av4()),
        av3: Some(av3()),
        av2: None,
        avaliacao: Some(df!("uuid" => ["A1"], "fazendaRef" => ["F1"]).unwrap()),
        fazenda: Some(
            df!(
                "uuid" => ["F1"],
                "nomeFazenda" => ["Boa Vista"],
                "nomeProdutor" => ["João Silva"],
                "cidadeRef" => ["C1"],
                "latitude" => ["-12.5"]
            )
            .unwrap(),
        ),
        cidade: Some(
            df!("uuid" => ["C1"], "nomeCidade" => ["Sorriso"], "estadoRef" => ["E1"], "codigoCidade" => ["510792"])
                .unwrap(),
        ),
        estado: Some(
            df!("uuid" => ["E1"], "codigoEstado" => ["51"], "nomeEstado" => ["MT"], "paisRef" => ["BR"])
                .unwrap(),
        ),
        users: Some(
            df!(
                "uuid" => ["U1", "U2"],
                "displayName" => ["maria", "raullanconi"],
                "email" => ["m@x", "r@x"]
            )
            .unwrap(),
        ),
        regions: Some(
            df!(
                "cidade_siglaEstado" => ["Sorriso_MT"],
                "regiao" => ["Médio Norte"],
                "ibge" => ["510792"]
            )
            .unwrap(),
        ),
    }
}

fn text(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    text_values(df, name).unwrap()
}

#[test]
fn single_strip_plot_builds_keyed_row_with_metrics() {
    let output = TrialDataTransformer::default().transform(&tables()).unwrap();
    let treated = &output.treated;

    // P2 belongs to the excluded technician, P3 is not a strip test.
    assert_eq!(treated.height(), 1);
    assert_eq!(text(treated, "key"), vec![Some("F1_AG 8480_101".to_string())]);
    assert_eq!(text(treated, "fazendaRef"), vec![Some("F1".to_string())]);

    assert_eq!(f64_values(treated, derived::MEDIA_PMG).unwrap(), vec![Some(20.0)]);
    assert_eq!(f64_values(treated, derived::MEDIA_UMD_PMG).unwrap(), vec![Some(20.0)]);
    let pmg = f64_values(treated, derived::CORR_PMG).unwrap();
    assert!((pmg[0].unwrap() - 20.0 * 80.0 / 86.5).abs() < 1e-9);
    assert_eq!(f64_values(treated, derived::AREA_PARCELA_M2).unwrap(), vec![Some(10.0)]);

    let sc = f64_values(treated, derived::PROD_SC_HA_CORR).unwrap();
    assert!((sc[0].unwrap() - 150.0).abs() < 1e-9);
    assert_eq!(f64_values(treated, derived::NUM_PLANTAS_HA).unwrap(), vec![Some(40_000.0)]);
    assert_eq!(f64_values(treated, derived::PERC_TOTAL).unwrap(), vec![Some(400.0)]);
    assert_eq!(f64_values(treated, derived::MEDIA_ALT_M).unwrap(), vec![Some(0.2)]);
    assert_eq!(text(treated, derived::PLANTIO), vec![Some("01/10/2024".to_string())]);
    assert_eq!(f64_values(treated, derived::CICLO_DIAS).unwrap(), vec![Some(137.0)]);
    assert_eq!(f64_values(treated, derived::FLOR_FEM_DIAS).unwrap(), vec![Some(61.0)]);
    assert_eq!(f64_values(treated, derived::FLOR_MASC_DIAS).unwrap(), vec![Some(60.0)]);
    assert_eq!(f64_values(treated, "manchaBranca").unwrap(), vec![Some(7.0)]);

    assert!(output.report.skipped.is_empty(), "{:?}", output.report.skipped);
}

#[test]
fn reference_joins_attach_location_and_uppercase_names() {
    let output = TrialDataTransformer::default().transform(&tables()).unwrap();
    let treated = &output.treated;

    assert_eq!(text(treated, "nomeFazenda"), vec![Some("BOA VISTA".to_string())]);
    assert_eq!(text(treated, "nomeProdutor"), vec![Some("JOÃO SILVA".to_string())]);
    assert_eq!(text(treated, "cidade_siglaEstado"), vec![Some("Sorriso_MT".to_string())]);
    assert_eq!(text(treated, "estado"), vec![Some("51".to_string())]);
    assert_eq!(text(treated, "regiao"), vec![Some("Médio Norte".to_string())]);
    assert_eq!(text(treated, "displayName"), vec![Some("maria".to_string())]);

    for dropped in ["latitude", "codigoCidade", "paisRef", "ibge", "email"] {
        assert!(treated.column(dropped).is_err(), "{dropped} should be dropped");
    }
}

#[test]
fn round_outputs_keep_their_shapes() {
    let output = TrialDataTransformer::default().transform(&tables()).unwrap();

    assert_eq!(output.av4_merged.height(), 2);
    assert!(output.av4_merged.column("fazendaRef_tratamento").is_ok());
    assert_eq!(output.av3_merged.height(), 2);
    assert_eq!(
        output.av3_merged.get_column_names_str(),
        vec!["manchaBranca", "key"]
    );
    assert_eq!(output.av2_merged.height(), 0);
    assert!(output
        .report
        .skipped_steps
        .iter()
        .any(|s| s.step == "av2TratamentoMilho" && s.reason == SkipReason::MissingTable("av2TratamentoMilho".into())));
}

#[test]
fn unknown_technician_is_kept() {
    let mut tables = tables();
    let mut av4 = av4();
    av4.with_column(Column::new(
        "dtcResponsavelRef".into(),
        [None::<&str>, Some("U2"), None],
    ))
    .unwrap();
    tables.av4 = Some(av4);

    let output = TrialDataTransformer::default().transform(&tables).unwrap();

    assert_eq!(output.treated.height(), 1);
    assert_eq!(text(&output.treated, "displayName"), vec![None]);
}

#[test]
fn transform_is_idempotent() {
    let transformer = TrialDataTransformer::default();
    let tables = tables();

    let first = transformer.transform(&tables).unwrap();
    let second = transformer.transform(&tables).unwrap();

    assert!(first.treated.equals_missing(&second.treated));
    assert_eq!(first.report, second.report);
}

#[test]
fn missing_tables_degrade_to_empty_output() {
    let output = TrialDataTransformer::default()
        .transform(&TrialTables::default())
        .unwrap();

    assert_eq!(output.treated.height(), 0);
    assert!(output
        .report
        .skipped_steps
        .iter()
        .any(|s| s.step == "avaliacao"));
}

#[test]
fn missing_av3_leaves_treated_empty() {
    let mut tables = tables();
    tables.av3 = None;

    let output = TrialDataTransformer::default().transform(&tables).unwrap();

    assert_eq!(output.treated.height(), 0);
    assert_eq!(output.av4_merged.height(), 2);
}

#[test]
fn missing_state_table_skips_region_lookup() {
    let mut tables = tables();
    tables.estado = None;

    let output = TrialDataTransformer::default().transform(&tables).unwrap();
    let steps: Vec<&str> = output
        .report
        .skipped_steps
        .iter()
        .map(|s| s.step.as_str())
        .collect();

    assert_eq!(output.treated.height(), 1);
    assert!(steps.contains(&"estado"));
    assert!(steps.contains(&"base_municipios_regioes_soja_milho"));
    assert!(output.treated.column("regiao").is_err());
}

#[test]
fn absent_round_is_reported_once() {
    let output = TrialDataTransformer::default().transform(&tables()).unwrap();

    let av2_entries: Vec<_> = output
        .report
        .skipped_steps
        .iter()
        .filter(|s| s.step.contains("av2") || s.reason.to_string().contains("av2"))
        .collect();

    assert_eq!(av2_entries.len(), 1, "{av2_entries:?}");
    assert_eq!(
        av2_entries[0].reason,
        SkipReason::MissingTable("av2TratamentoMilho".into())
    );
}

#[test]
fn repeated_plot_key_keeps_one_row_per_av4_plot() {
    let mut tables = tables();
    tables.av3 = Some(
        df!(
            "uuid" => ["Q1", "Q1b", "Q2"],
            "tipoTeste" => ["Faixa", "Faixa", "Faixa"],
            "avaliacaoRef" => ["A1", "A1", "A1"],
            "nome" => ["AG 8480", "AG 8480", "DKB 255"],
            "indexTratamento" => ["101", "101", "102"],
            "manchaBranca" => ["7", "9", "5"]
        )
        .unwrap(),
    );

    let output = TrialDataTransformer::default().transform(&tables).unwrap();

    assert_eq!(text(&output.treated, "key"), vec![Some("F1_AG 8480_101".to_string())]);
    assert_eq!(f64_values(&output.treated, "manchaBranca").unwrap(), vec![Some(7.0)]);
    assert_eq!(output.av3_merged.height(), 3);
    assert_eq!(
        output.report.duplicate_keys,
        vec![DuplicateKeys {
            round: "av3TratamentoMilho".to_string(),
            keys: vec!["F1_AG 8480_101".to_string()],
        }]
    );
}

#[test]
fn unique_keys_leave_no_duplicate_entries() {
    let output = TrialDataTransformer::default().transform(&tables()).unwrap();
    assert!(output.report.duplicate_keys.is_empty());
}
