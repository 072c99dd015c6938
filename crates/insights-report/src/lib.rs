//! insights-report: CSV tables and HTML reports for INSIGHTs.

pub mod csv;
pub mod html;
