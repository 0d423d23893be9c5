use crate::config::PlaceholderStyle;
use crate::error::CompileResult;
use crate::param::{ParamList, SqlParameter};
use tokio_postgres::types::ToSql;

/// Per-render state: the parameter list and the placeholder syntax.
///
/// A fresh context is created for every render, so numbering always starts at
/// zero and follows the textual order of the output.
#[derive(Debug)]
pub struct BuildContext {
    params: ParamList,
    style: PlaceholderStyle,
}

impl BuildContext {
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            params: ParamList::new(),
            style,
        }
    }

    /// Register `param` and append its placeholder to `out`.
    pub fn bind(&mut self, out: &mut String, param: &SqlParameter) {
        let index = self.params.push(param.clone());
        self.style.write(out, index);
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Finish the render.
    pub fn finish(self, sql: String) -> CompiledQuery {
        CompiledQuery {
            sql,
            params: self.params.into_vec(),
        }
    }
}

/// Rendered SQL text and its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParameter>,
}

impl CompiledQuery {
    /// Parameters as references compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }

    /// The raw parameter values, without type hints.
    pub fn values(&self) -> Vec<&serde_json::Value> {
        self.params.iter().map(|p| &p.value).collect()
    }
}

/// Anything that renders into SQL text with bound parameters.
pub trait Render {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()>;

    /// Render with `:N` placeholders.
    fn build(&self) -> CompileResult<CompiledQuery> {
        self.build_with(PlaceholderStyle::Named)
    }

    /// Render with the given placeholder style.
    fn build_with(&self, style: PlaceholderStyle) -> CompileResult<CompiledQuery> {
        let mut ctx = BuildContext::new(style);
        let mut out = String::new();
        self.render(&mut out, &mut ctx)?;
        Ok(ctx.finish(out))
    }

    /// Debug helper returning only the SQL text.
    fn to_sql(&self) -> CompileResult<String> {
        Ok(self.build()?.sql)
    }
}
