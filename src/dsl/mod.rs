//! SQL-like filter expressions over OSM tags.
//!
//! Syntax:
//!   key = 'value'             - exact match
//!   key <> 'value'            - not equal (also true when the key is absent)
//!   key LIKE 'Sa%'            - case-insensitive wildcard; % = any run, ? = one char
//!   key < 5, key <= '5', ...  - numeric comparison
//!   'value' = key             - literal first, always an equality test
//!   expr AND expr             - AND
//!   expr OR expr              - OR (lower precedence than AND)
//!   ( expr )                  - grouping

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;

pub use ast::*;
pub use error::FilterError;
pub use eval::evaluate_filter;
pub use parser::parse_filter;
