//! Derive macro for mapping structs onto rows.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr};

struct Column {
    field: syn::Ident,
    name: String,
}

/// Reads `#[row(rename = "...")]` and `#[row(skip)]` from a field.
///
/// Returns `None` for skipped fields.
fn column(field: &syn::Field) -> syn::Result<Option<Column>> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Record fields must be named"))?;
    let mut name = ident.to_string().trim_start_matches("r#").to_string();
    let mut skip = false;

    for attr in &field.attrs {
        if attr.path().is_ident("row") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    name = value.value();
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `rename` or `skip`"))
                }
            })?;
        }
    }

    Ok((!skip).then_some(Column { field: ident, name }))
}

/// Implementation of the `Record` derive macro.
pub fn record_impl(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let item_tokens: TokenStream = item.into();
    let input = match syn::parse2::<DeriveInput>(item_tokens) {
        Ok(tree) => tree,
        Err(e) => return e.to_compile_error().into(),
    };

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut columns = Vec::new();
    for field in fields {
        if let Some(column) = column(field)? {
            columns.push(column);
        }
    }
    if columns.is_empty() {
        return Err(syn::Error::new_spanned(
            input,
            "Record needs at least one column",
        ));
    }

    let struct_name = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let idents: Vec<&syn::Ident> = columns.iter().map(|c| &c.field).collect();

    Ok(quote! {
        impl #impl_generics ::stepwise_core::value::IntoRow for #struct_name #type_generics #where_clause {
            fn into_row(self) -> ::stepwise_core::value::Row {
                ::stepwise_core::value::Row::new()
                    #(.with(#names, self.#idents))*
            }
        }

        impl #impl_generics ::stepwise_core::value::Record for #struct_name #type_generics #where_clause {
            const COLUMNS: &'static [&'static str] = &[#(#names),*];
        }
    })
}
