mod catalog;
mod pattern;

pub use catalog::{
    catalog_key, CatalogCache, CatalogCategory, CatalogError, CatalogSource, CatalogValidator,
    InMemoryCatalog, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_TTL,
};
pub use pattern::{
    is_account_code, is_amount, is_bounded_text, is_case_number, is_compact_date,
    is_identifier_code, is_person_name, matches_kind,
};
