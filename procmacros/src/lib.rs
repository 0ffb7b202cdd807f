//! Derive macros for kiln.

mod helpers;
mod model;
mod paths;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `Model` and `Record` for a struct with named fields.
///
/// Struct attribute:
/// * `#[model(table = "people")]` overrides the table, which defaults to
///   the pluralized snake_case type name.
/// * `#[model(table_fn = path::to::fn)]` resolves the table name from the
///   request context, `fn(&Context) -> Result<String>`.
///
/// Field attributes:
/// * `#[column(primary)]`, `#[column(name = "...")]`,
///   `#[column(select = "expr as name")]`, `#[column(readonly)]`,
///   `#[column(writeonly)]`, `#[column(skip)]`. Without a `primary`
///   marker the field named `id` is the primary key.
/// * `#[belongs_to]`, `#[has_one]`, `#[has_many]` and
///   `#[many_to_many(through = "join_table")]`, each accepting
///   `foreign_key`, `references` and `order_by`; many-to-many also takes
///   `target_key`.
///
/// ```ignore
/// #[derive(Debug, Clone, Default, Model)]
/// struct User {
///     id: i64,
///     name: String,
///     #[has_many(order_by = "books.title asc")]
///     books: Vec<Book>,
///     #[belongs_to]
///     house: Option<Address>,
///     house_id: Option<i64>,
/// }
/// ```
#[proc_macro_derive(
    Model,
    attributes(model, column, belongs_to, has_one, has_many, many_to_many)
)]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match model::derive_model(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
