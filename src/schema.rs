//! Column-name constants for the corn trial tables.
//! Single source of truth - exported to Python via PyO3.

// ── Table names ─────────────────────────────────────────────────────────────
pub mod table {
    pub const AV2_TRATAMENTO: &str = "av2TratamentoMilho";
    pub const AV3_TRATAMENTO: &str = "av3TratamentoMilho";
    pub const AV4_TRATAMENTO: &str = "av4TratamentoMilho";
    pub const AVALIACAO: &str = "avaliacao";
    pub const FAZENDA: &str = "fazenda";
    pub const CIDADE: &str = "cidade";
    pub const ESTADO: &str = "estado";
    pub const USERS: &str = "users";
    pub const REGIOES: &str = "base_municipios_regioes_soja_milho";
}

// ── Columns shared by every source table ────────────────────────────────────
pub mod common {
    pub const UUID: &str = "uuid";
    pub const DATA_SYNC: &str = "dataSync";
    pub const ACAO: &str = "acao";
    pub const FIREBASE: &str = "firebase";
}

// ── Treatment round columns ─────────────────────────────────────────────────
pub mod treatment {
    pub const TIPO_TESTE: &str = "tipoTeste";
    pub const AVALIACAO_REF: &str = "avaliacaoRef";
    pub const FAZENDA_REF: &str = "fazendaRef";
    pub const NOME: &str = "nome";
    pub const INDEX_TRATAMENTO: &str = "indexTratamento";
    pub const KEY: &str = "key";
    pub const DTC_RESPONSAVEL_REF: &str = "dtcResponsavelRef";

    pub const NUMERO_LINHAS: &str = "numeroLinhas";
    pub const COMPRIMENTO_LINHA: &str = "comprimentoLinha";
    pub const ESPACAMENTO: &str = "espacamento";
    pub const PESO_PARCELA: &str = "pesoParcela";
    pub const HUMIDADE: &str = "humidade";
    pub const GRAOS_ARDIDOS: &str = "graosArdidos";

    pub const DATA_PLANTIO: &str = "dataPlantioMilho";
    pub const DATA_COLHEITA: &str = "dataColheitaMilho";
    pub const DATA_FLOR_FEMININA: &str = "dataFlorescimentoFeminina";
    pub const DATA_FLOR_MASCULINA: &str = "dataFlorescimentoMasculina";

    /// Dropped from the av2/av3 rounds before they are merged onto av4.
    pub const ROUND_DROP: [&str; 11] = [
        "uuid",
        "dataSync",
        "acao",
        "cultivar",
        TIPO_TESTE,
        NOME,
        "populacao",
        INDEX_TRATAMENTO,
        AVALIACAO_REF,
        "idBaseRef",
        FAZENDA_REF,
    ];
}

// ── Farm / city / state / region / user reference columns ───────────────────
pub mod fazenda {
    pub const NOME_FAZENDA: &str = "nomeFazenda";
    pub const NOME_PRODUTOR: &str = "nomeProdutor";
    pub const CIDADE_REF: &str = "cidadeRef";

    pub const DROP: [&str; 16] = [
        "dataSync",
        "acao",
        "isMilho",
        "isSoja",
        "latitude",
        "longitude",
        "altitude",
        "safra",
        "criadoEm",
        "modificadoEm",
        "epoca",
        "rcResponsavel",
        "dataPlantio",
        "dataColheita",
        "hide",
        "firebase",
    ];
}

pub mod cidade {
    pub const NOME_CIDADE: &str = "nomeCidade";
    pub const ESTADO_REF: &str = "estadoRef";
    pub const CIDADE_SIGLA_ESTADO: &str = "cidade_siglaEstado";

    pub const DROP: [&str; 4] = ["dataSync", "acao", "codigoCidade", "firebase"];
}

pub mod estado {
    pub const CODIGO_ESTADO: &str = "codigoEstado";
    pub const NOME_ESTADO: &str = "nomeEstado";
    pub const ESTADO: &str = "estado";
    pub const SIGLA_ESTADO: &str = "siglaEstado";

    pub const DROP: [&str; 4] = ["dataSync", "acao", "paisRef", "firebase"];
}

pub mod regiao {
    pub const DROP: [&str; 6] = [
        "ibge",
        "macroSoja",
        "recSoja",
        "regiaoEconomica",
        "mesoRegiaoSoja",
        "microRegiaoSoja",
    ];
}

pub mod users {
    pub const DISPLAY_NAME: &str = "displayName";
}

// ── Replicate measurement groups (planta1..planta5) ─────────────────────────
pub mod replicate {
    /// Output column and the suffix shared by its five `plantaN` inputs.
    pub const GROUPS: [(&str, &str); 11] = [
        (super::derived::MEDIA_NUM_PLANTAS_10M, "NumPlantas10metros"),
        (super::derived::MEDIA_ACAMADAS, "NumPlantasAcamadas"),
        (super::derived::MEDIA_QUEBRADAS, "NumPlantasQuebradas"),
        (super::derived::MEDIA_DOMINADAS, "NumPlantasDominadas"),
        (super::derived::MEDIA_COLMO_PODRE, "ColmoPodre"),
        (super::derived::MEDIA_NUM_FILEIRAS, "NumFileiras"),
        (super::derived::MEDIA_GRAOS_FILEIRA, "NumGraosPorFileira"),
        (super::derived::MEDIA_PMG, "PesoMilGraos"),
        (super::derived::MEDIA_UMD_PMG, "UmidadeAmostraMilGraos"),
        (super::derived::MEDIA_ALT, "AlturaPlanta"),
        (super::derived::MEDIA_AIE, "AlturaEspiga"),
    ];

    pub const PLANTS: usize = 5;

    /// `planta{n}{suffix}` for n in 1..=5.
    pub fn columns(suffix: &str) -> Vec<String> {
        (1..=PLANTS).map(|n| format!("planta{n}{suffix}")).collect()
    }
}

// ── Derived metric columns ──────────────────────────────────────────────────
pub mod derived {
    pub const MEDIA_NUM_PLANTAS_10M: &str = "media_NumPlantas10metros";
    pub const MEDIA_ACAMADAS: &str = "media_NumPlantasAcamadas";
    pub const MEDIA_QUEBRADAS: &str = "media_NumPlantasQuebradas";
    pub const MEDIA_DOMINADAS: &str = "media_NumPlantasDominadas";
    pub const MEDIA_COLMO_PODRE: &str = "media_ColmoPodre";
    pub const MEDIA_NUM_FILEIRAS: &str = "media_NumFileiras";
    pub const MEDIA_GRAOS_FILEIRA: &str = "media_NumGraosPorFileira";
    pub const MEDIA_PMG: &str = "media_PMG";
    pub const MEDIA_UMD_PMG: &str = "media_umd_PMG";
    pub const MEDIA_ALT: &str = "media_ALT";
    pub const MEDIA_AIE: &str = "media_AIE";

    pub const CORR_PMG: &str = "corr_PMG";
    pub const AREA_PARCELA_M2: &str = "area_parcela_m2";
    pub const PROD_KG_HA: &str = "prod_kg_ha";
    pub const PROD_KG_HA_CORR: &str = "prod_kg_ha_corr";
    pub const PROD_SC_HA_CORR: &str = "prod_sc_ha_corr";
    pub const NUM_PLANTAS_HA: &str = "numPlantas_ha";
    pub const PERC_ACAMADAS: &str = "perc_Acamadas";
    pub const PERC_QUEBRADAS: &str = "perc_Quebradas";
    pub const PERC_DOMINADAS: &str = "perc_Dominadas";
    pub const PERC_COLMO_PODRE: &str = "perc_ColmoPodre";
    pub const PERC_TOTAL: &str = "perc_Total";
    pub const MEDIA_ALT_M: &str = "media_ALT_m";
    pub const MEDIA_AIE_M: &str = "media_AIE_m";

    pub const PLANTIO: &str = "plantio";
    pub const COLHEITA: &str = "colheita";
    pub const DATA_FLOR_FEM: &str = "dataFlorFem";
    pub const DATA_FLOR_MASC: &str = "dataFlorMasc";
    pub const CICLO_DIAS: &str = "ciclo_dias";
    pub const FLOR_FEM_DIAS: &str = "flor_fem_dias";
    pub const FLOR_MASC_DIAS: &str = "flor_masc_dias";

    pub const LOSS_PARTS: [&str; 4] = [PERC_ACAMADAS, PERC_QUEBRADAS, PERC_DOMINADAS, PERC_COLMO_PODRE];
}

// ── Analysis output columns ─────────────────────────────────────────────────
pub mod analysis {
    pub const INDEX_AGRUPADO: &str = "indexTratamentoAgrupado";
    pub const MEDIA_LOCAL_SC_HA: &str = "media_local_sc_ha";
    pub const PROD_MAX_FAZENDA: &str = "prod_max_fazenda";
    pub const DIFF_TO_MAX: &str = "diff_to_max";
    pub const PROD_REL_PCT: &str = "prod_rel_pct";
    pub const RANKING: &str = "ranking";

    pub const HEAD: &str = "head";
    pub const CHECK: &str = "check";
    pub const HEAD_PROD: &str = "head_prod_sc_ha";
    pub const CHECK_PROD: &str = "check_prod_sc_ha";
    pub const HEAD_POP: &str = "head_pop_ha";
    pub const CHECK_POP: &str = "check_pop_ha";
    pub const HEAD_UMD: &str = "head_umd";
    pub const CHECK_UMD: &str = "check_umd";
    pub const DIFF_SC_HA: &str = "diff_sc_ha";
}

// ── Disease score columns (1-9 scale, lower is worse) ───────────────────────
pub mod disease {
    pub const MANCHA_TURCICUM: &str = "manchaTurcicum";
    pub const MANCHA_CERCOSPORA: &str = "manchaCercospora";
    pub const MANCHA_BRANCA: &str = "manchaBranca";
    pub const MANCHA_BIPOLARIS: &str = "manchaBipolaris";
    pub const FERRUGEM_TROPICAL: &str = "ferrugemTropical";
    pub const ENFEZAMENTO: &str = "enfezamento";
    pub const TOMBAMENTO_VERDE: &str = "tombamentoVerde";

    pub const ALL: [&str; 7] = [
        MANCHA_TURCICUM,
        MANCHA_CERCOSPORA,
        MANCHA_BRANCA,
        MANCHA_BIPOLARIS,
        FERRUGEM_TROPICAL,
        ENFEZAMENTO,
        TOMBAMENTO_VERDE,
    ];

    /// Scores below this count as an incidence.
    pub const INCIDENCE_BELOW: f64 = 6.0;
}
