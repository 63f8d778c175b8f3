use std::fs;
use std::path::Path;

use corn_trialkit::frame::text_values;
use corn_trialkit::{
    CsvDirectorySource, SourceConfig, TableSource, TrialDataTransformer, TrialRepository,
};

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(format!("{name}.csv")), body).unwrap();
}

fn seed(dir: &Path) {
    write(
        dir,
        "av4TratamentoMilho",
        "uuid,tipoTeste,avaliacaoRef,nome,indexTratamento,pesoParcela\n\
         P1,Faixa,A1,AG 8480,101,9\n\
         P2,Parcela,A1,AG 8480,102,9\n",
    );
    write(
        dir,
        "av3TratamentoMilho",
        "uuid,tipoTeste,avaliacaoRef,nome,indexTratamento,manchaBranca\n\
         Q1,Faixa,A1,AG 8480,101,7\n",
    );
    write(dir, "avaliacao", "uuid,fazendaRef\nA1,F1\n");
    write(dir, "fazenda", "uuid,nomeFazenda,cidadeRef\nF1,Boa Vista,C1\n");
}

#[test]
fn csv_directory_feeds_the_transformer() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let mut repo = TrialRepository::new(
        CsvDirectorySource::new(dir.path()),
        TrialDataTransformer::default(),
    );
    let output = repo.get().unwrap();

    assert_eq!(output.treated.height(), 1);
    assert_eq!(
        text_values(&output.treated, "key").unwrap(),
        vec![Some("F1_AG 8480_101".to_string())]
    );
    assert_eq!(
        text_values(&output.treated, "nomeFazenda").unwrap(),
        vec![Some("BOA VISTA".to_string())]
    );
    assert!(output
        .report
        .skipped_steps
        .iter()
        .any(|s| s.step == "cidade"));
}

#[test]
fn cache_survives_source_changes_until_invalidated() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let mut repo = TrialRepository::new(
        CsvDirectorySource::new(dir.path()),
        TrialDataTransformer::default(),
    );
    assert_eq!(repo.get().unwrap().treated.height(), 1);

    fs::remove_file(dir.path().join("av3TratamentoMilho.csv")).unwrap();
    assert_eq!(repo.get().unwrap().treated.height(), 1);

    repo.invalidate();
    assert!(repo.cached().is_none());
    assert_eq!(repo.get().unwrap().treated.height(), 0);
}

#[test]
fn unreadable_table_is_a_source_error() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    write(dir.path(), "users", "uuid,displayName\nU1,maria,extra,fields\n");

    let source = CsvDirectorySource::from_config(&SourceConfig {
        data_dir: dir.path().to_path_buf(),
        ..SourceConfig::default()
    });

    let err = source.fetch_all().unwrap_err();
    assert!(err.to_string().contains("users"), "{err}");
}
