use std::collections::HashMap;

use polars::prelude::*;

use crate::schema::table;

/// The raw tables the transformer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Av2Tratamento,
    Av3Tratamento,
    Av4Tratamento,
    Avaliacao,
    Fazenda,
    Cidade,
    Estado,
    Users,
    Regioes,
}

impl TableName {
    pub const ALL: [TableName; 9] = [
        TableName::Av2Tratamento,
        TableName::Av3Tratamento,
        TableName::Av4Tratamento,
        TableName::Avaliacao,
        TableName::Fazenda,
        TableName::Cidade,
        TableName::Estado,
        TableName::Users,
        TableName::Regioes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Av2Tratamento => table::AV2_TRATAMENTO,
            TableName::Av3Tratamento => table::AV3_TRATAMENTO,
            TableName::Av4Tratamento => table::AV4_TRATAMENTO,
            TableName::Avaliacao => table::AVALIACAO,
            TableName::Fazenda => table::FAZENDA,
            TableName::Cidade => table::CIDADE,
            TableName::Estado => table::ESTADO,
            TableName::Users => table::USERS,
            TableName::Regioes => table::REGIOES,
        }
    }

    /// Accepts both `av4TratamentoMilho` and the dashboard's `df_av4TratamentoMilho`.
    pub fn parse(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("df_").unwrap_or(name);
        Self::ALL.into_iter().find(|t| t.as_str() == bare)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inputs of one transformation. Every table is optional; the
/// transformer degrades when one is absent.
#[derive(Debug, Clone, Default)]
pub struct TrialTables {
    pub av2: Option<DataFrame>,
    pub av3: Option<DataFrame>,
    pub av4: Option<DataFrame>,
    pub avaliacao: Option<DataFrame>,
    pub fazenda: Option<DataFrame>,
    pub cidade: Option<DataFrame>,
    pub estado: Option<DataFrame>,
    pub users: Option<DataFrame>,
    pub regions: Option<DataFrame>,
}

impl TrialTables {
    /// Build from a name → frame map. Unknown names are ignored.
    pub fn from_map(map: HashMap<String, DataFrame>) -> Self {
        let mut tables = Self::default();
        for (name, df) in map {
            if let Some(t) = TableName::parse(&name) {
                tables.set(t, df);
            }
        }
        tables
    }

    pub fn get(&self, name: TableName) -> Option<&DataFrame> {
        self.slot(name).as_ref()
    }

    pub fn set(&mut self, name: TableName, df: DataFrame) {
        *self.slot_mut(name) = Some(df);
    }

    fn slot(&self, name: TableName) -> &Option<DataFrame> {
        match name {
            TableName::Av2Tratamento => &self.av2,
            TableName::Av3Tratamento => &self.av3,
            TableName::Av4Tratamento => &self.av4,
            TableName::Avaliacao => &self.avaliacao,
            TableName::Fazenda => &self.fazenda,
            TableName::Cidade => &self.cidade,
            TableName::Estado => &self.estado,
            TableName::Users => &self.users,
            TableName::Regioes => &self.regions,
        }
    }

    fn slot_mut(&mut self, name: TableName) -> &mut Option<DataFrame> {
        match name {
            TableName::Av2Tratamento => &mut self.av2,
            TableName::Av3Tratamento => &mut self.av3,
            TableName::Av4Tratamento => &mut self.av4,
            TableName::Avaliacao => &mut self.avaliacao,
            TableName::Fazenda => &mut self.fazenda,
            TableName::Cidade => &mut self.cidade,
            TableName::Estado => &mut self.estado,
            TableName::Users => &mut self.users,
            TableName::Regioes => &mut self.regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_and_bare_names() {
        assert_eq!(TableName::parse("df_av4TratamentoMilho"), Some(TableName::Av4Tratamento));
        assert_eq!(TableName::parse("fazenda"), Some(TableName::Fazenda));
        assert_eq!(
            TableName::parse("df_base_municipios_regioes_soja_milho"),
            Some(TableName::Regioes)
        );
        assert_eq!(TableName::parse("av1TratamentoMilho"), None);
    }

    #[test]
    fn from_map_ignores_unknown_tables() {
        let mut map = HashMap::new();
        map.insert("df_fazenda".to_string(), DataFrame::empty());
        map.insert("df_av1TratamentoMilho".to_string(), DataFrame::empty());

        let tables = TrialTables::from_map(map);

        assert!(tables.fazenda.is_some());
        assert!(tables.get(TableName::Av2Tratamento).is_none());
    }
}
