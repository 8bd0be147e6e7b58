mod record;

/// Derive macro mapping a struct onto a table row.
///
/// Implements `stepwise_core::value::IntoRow` and
/// `stepwise_core::value::Record` for structs with named fields. Every field
/// becomes a column named after the field, in declaration order; field types
/// must convert into `stepwise_core::value::Value`.
///
/// # Basic Usage
///
/// ```ignore
/// use stepwise_derive::Record;
///
/// #[derive(Record)]
/// struct User {
///     name: String,
///     email: Option<String>,
/// }
///
/// assert_eq!(User::COLUMNS, &["name", "email"]);
/// ```
///
/// # Field Attributes
///
/// ```ignore
/// #[derive(Record)]
/// struct Event {
///     #[row(rename = "type")]
///     kind: String,
///     #[row(skip)]
///     cached: Vec<u8>,
/// }
/// ```
#[proc_macro_derive(Record, attributes(row))]
pub fn record(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    record::record_impl(item)
}
