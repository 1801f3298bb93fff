//! `#[derive(Model)]` — generates a [`modelstore::model::ModelDescriptor`]
//! implementation from struct and field attributes.
//!
//! This is pure ergonomic sugar over the hand-implementable
//! `ModelDescriptor` trait; nothing in the engine requires it. Grounded on
//! the teacher's `avocado_derive::Doc` (`#[proc_macro_derive(Doc,
//! attributes(avocado, index))]`), rewritten against modern `syn` (the
//! teacher's macro predates `syn 1.0`'s attribute-parsing API and no
//! longer compiles as written).
//!
//! ```ignore
//! #[derive(Model)]
//! #[model(table = "widgets")]
//! struct Widget {
//!     #[model(id)]
//!     other_id: String,
//!     #[model(unique = "sku")]
//!     sku: String,
//!     name: String,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

#[derive(Default)]
struct ContainerAttrs {
    table: Option<String>,
    database: Option<String>,
    has_custom_id: bool,
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    type_tag: Option<String>,
    is_id: bool,
    unique_group: Option<String>,
}

fn parse_container_attrs(input: &DeriveInput) -> syn::Result<ContainerAttrs> {
    let mut attrs = ContainerAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.table = Some(value.value());
            } else if meta.path.is_ident("database") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.database = Some(value.value());
            } else if meta.path.is_ident("has_custom_id") {
                attrs.has_custom_id = true;
            } else {
                return Err(meta.error("unrecognized `model` container attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                attrs.is_id = true;
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(value.value());
            } else if meta.path.is_ident("type") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.type_tag = Some(value.value());
            } else if meta.path.is_ident("unique") {
                // `#[model(unique)]` groups the field alone; `#[model(unique = "group")]`
                // joins a composite unique index shared with other fields tagged the
                // same group name, in declaration order.
                let group = if meta.input.peek(syn::Token![=]) {
                    let value: LitStr = meta.value()?.parse()?;
                    value.value()
                } else {
                    field
                        .ident
                        .as_ref()
                        .map(|i| i.to_string())
                        .unwrap_or_default()
                };
                attrs.unique_group = Some(group);
            } else {
                return Err(meta.error("unrecognized `model` field attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

/// Derives [`modelstore::model::ModelDescriptor`] for a struct.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = input.ident.clone();
    let container = parse_container_attrs(&input)?;

    let table = container.table.ok_or_else(|| {
        syn::Error::new_spanned(&ident, "`#[derive(Model)]` requires `#[model(table = \"...\")]`")
    })?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => return Err(syn::Error::new_spanned(&ident, "`#[derive(Model)]` requires named fields")),
        },
        _ => return Err(syn::Error::new_spanned(&ident, "`#[derive(Model)]` only supports structs")),
    };

    let mut field_inserts = Vec::new();
    let mut unique_groups: Vec<(String, Vec<String>)> = Vec::new();

    for field in fields {
        let field_ident = field.ident.as_ref().expect("named field");
        let logical_name = field_ident.to_string();
        let attrs = parse_field_attrs(field)?;

        let physical = attrs.rename.clone().unwrap_or_else(|| logical_name.clone());
        let is_id = attrs.is_id;
        let type_tag = match &attrs.type_tag {
            Some(t) => quote! { Some(#t.to_string()) },
            None => quote! { None },
        };

        field_inserts.push(quote! {
            fields.insert(
                #logical_name.to_string(),
                ::modelstore::model::FieldSpec {
                    field: Some(#physical.to_string()),
                    r#type: #type_tag,
                    is_id: #is_id,
                    mapper: None,
                },
            );
        });

        if let Some(group) = attrs.unique_group {
            match unique_groups.iter_mut().find(|(name, _)| *name == group) {
                Some((_, members)) => members.push(logical_name),
                None => unique_groups.push((group, vec![logical_name])),
            }
        }
    }

    let unique_index_inserts = unique_groups.into_iter().map(|(_, members)| {
        quote! { unique_indexes.push(vec![#(#members.to_string()),*]); }
    });

    let database_impl = match container.database {
        Some(db) => quote! { fn database(&self) -> Option<&str> { Some(#db) } },
        None => quote! {},
    };

    let has_custom_id = container.has_custom_id;

    let tokens = quote! {
        impl ::modelstore::model::ModelDescriptor for #ident {
            fn table(&self) -> &str {
                #table
            }

            #database_impl

            fn fields(&self) -> &::std::collections::HashMap<String, ::modelstore::model::FieldSpec> {
                static FIELDS: ::std::sync::OnceLock<::std::collections::HashMap<String, ::modelstore::model::FieldSpec>> =
                    ::std::sync::OnceLock::new();
                FIELDS.get_or_init(|| {
                    let mut fields = ::std::collections::HashMap::new();
                    #(#field_inserts)*
                    fields
                })
            }

            fn unique_indexes(&self) -> &[::modelstore::model::UniqueIndex] {
                static UNIQUE: ::std::sync::OnceLock<Vec<::modelstore::model::UniqueIndex>> =
                    ::std::sync::OnceLock::new();
                UNIQUE.get_or_init(|| {
                    let mut unique_indexes = Vec::new();
                    #(#unique_index_inserts)*
                    unique_indexes
                })
            }

            fn has_custom_id(&self) -> bool {
                #has_custom_id
            }
        }
    };

    Ok(tokens)
}
