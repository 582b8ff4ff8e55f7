use serde::Deserialize;

/// Query string of `/consulta`.
///
/// A missing filter keeps the value currently applied; an empty one clears it.
#[derive(Debug, Default, Deserialize)]
pub struct ConsultaQuery {
    pub nome: Option<String>,
    pub email: Option<String>,
    pub celular: Option<String>,
    pub page: Option<usize>,
}
