//! Derive macro for quarry records.
//!
//! This crate provides `#[derive(Record)]`, which implements
//! `quarry_core::Record` for a struct with named fields: a cached, flattened
//! property descriptor plus index-based property accessors.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Ident, Lit, Meta, Type};

/// Derives `quarry_core::Record` for a struct.
///
/// # Struct Attributes
///
/// - `#[record(table = "Customer")]` - Table the record maps to by default
/// - `#[record(accept_changes = "method")]` - Method called once after the
///   record has been materialized
///
/// # Field Attributes
///
/// - `#[column(name = "FullName")]` - Column name (defaults to the field name)
/// - `#[column(key)]` - Use the property as a key for updates and deletes
/// - `#[column(identity)]` - Database generated; never inserted or updated
/// - `#[column(nullable)]` - Accept `NULL` even when the type is not
///   `Option`; the field is reset to its default on `NULL`
/// - `#[column(ignore_on_insert)]` / `#[column(ignore_on_update)]`
/// - `#[column(decompose)]` - Flatten the properties of a nested record
/// - `#[column(not_mapped)]` - Leave the field out of the mapping
///
/// # Example
///
/// ```rust,ignore
/// use quarry_core::Record;
///
/// #[derive(Debug, Default, Record)]
/// #[record(table = "Customer")]
/// struct Customer {
///     #[column(name = "CustomerKey", key, identity)]
///     id: i64,
///     #[column(name = "FullName")]
///     name: String,
///     #[column(decompose)]
///     address: Address,
///     #[column(not_mapped)]
///     scratch: Vec<String>,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record, column))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_record_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_record_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record derive does not support generic structs",
        ));
    }
    let record_attrs = parse_record_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record derive only supports structs",
            ));
        }
    };

    let mut mapped: Vec<FieldInfo> = Vec::new();
    let mut not_mapped: Vec<String> = Vec::new();
    for field in fields {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let attrs = parse_column_attrs(&field.attrs)?;
        if attrs.not_mapped {
            not_mapped.push(ident.to_string());
            continue;
        }
        if attrs.decompose && (attrs.key || attrs.identity || attrs.name.is_some()) {
            return Err(syn::Error::new_spanned(
                field,
                "a decomposed field cannot carry column options",
            ));
        }
        mapped.push(FieldInfo {
            column: attrs.name.clone().unwrap_or_else(|| ident.to_string()),
            ident,
            ty: field.ty.clone(),
            attrs,
        });
    }

    let properties: Vec<TokenStream2> = mapped.iter().map(property_tokens).collect();
    let (read_arms, write_arms) = accessor_tokens(&mapped);

    let type_name = struct_name.to_string();
    let table = match &record_attrs.table {
        Some(table) => quote! { ::core::option::Option::Some(#table) },
        None => quote! { ::core::option::Option::None },
    };

    let nested_accept: Vec<TokenStream2> = mapped
        .iter()
        .filter(|f| f.attrs.decompose)
        .map(|f| {
            let ident = &f.ident;
            quote! { ::quarry_core::Record::accept_changes(&mut self.#ident); }
        })
        .collect();
    let own_accept = record_attrs.accept_changes.as_ref().map(|method| {
        let method = Ident::new(method, proc_macro2::Span::call_site());
        quote! { self.#method(); }
    });

    Ok(quote! {
        impl ::quarry_core::Record for #struct_name {
            fn descriptor() -> &'static ::quarry_core::TypeDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<::quarry_core::TypeDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    let mut properties: ::std::vec::Vec<::quarry_core::PropertyDescriptor> =
                        ::std::vec::Vec::new();
                    #(#properties)*
                    ::quarry_core::TypeDescriptor::new(
                        #type_name,
                        #table,
                        properties,
                        ::std::vec![#(::std::string::String::from(#not_mapped)),*],
                    )
                })
            }

            #[allow(unused_assignments, unused_mut)]
            fn read_property(&self, index: usize) -> ::core::option::Option<::quarry_core::SqlValue> {
                let mut offset = 0_usize;
                #(#read_arms)*
                ::core::option::Option::None
            }

            #[allow(unused_assignments, unused_mut)]
            fn write_property(
                &mut self,
                index: usize,
                value: ::quarry_core::SqlValue,
            ) -> ::quarry_core::Result<()> {
                let mut offset = 0_usize;
                #(#write_arms)*
                ::core::result::Result::Ok(())
            }

            fn accept_changes(&mut self) {
                #(#nested_accept)*
                #own_accept
            }
        }
    })
}

/// Statements pushing the descriptor entries of one field.
fn property_tokens(field: &FieldInfo) -> TokenStream2 {
    let ty = &field.ty;
    let path = field.ident.to_string();
    if field.attrs.decompose {
        return quote! {
            properties.extend(
                <#ty as ::quarry_core::Record>::descriptor()
                    .properties()
                    .iter()
                    .map(|property| property.nested_under(#path)),
            );
        };
    }

    let column = &field.column;
    let nullable_override = field.attrs.nullable;
    let mut builders = Vec::new();
    if field.attrs.key {
        builders.push(quote! { .key() });
    }
    if field.attrs.identity {
        builders.push(quote! { .identity() });
    }
    if field.attrs.ignore_on_insert {
        builders.push(quote! { .ignore_on_insert() });
    }
    if field.attrs.ignore_on_update {
        builders.push(quote! { .ignore_on_update() });
    }
    quote! {
        properties.push(
            ::quarry_core::PropertyDescriptor::new(
                #path,
                #column,
                <#ty as ::quarry_core::FieldType>::PROPERTY_TYPE,
                #nullable_override || <#ty as ::quarry_core::FieldType>::NULLABLE,
            )
            #(#builders)*
        );
    }
}

/// Index dispatch for reads and writes. Plain fields take one slot,
/// decomposed fields take as many slots as their own descriptor lists.
fn accessor_tokens(fields: &[FieldInfo]) -> (Vec<TokenStream2>, Vec<TokenStream2>) {
    let mut reads = Vec::with_capacity(fields.len());
    let mut writes = Vec::with_capacity(fields.len());
    for field in fields {
        let ident = &field.ident;
        let ty = &field.ty;
        if field.attrs.decompose {
            reads.push(quote! {
                let width = <#ty as ::quarry_core::Record>::descriptor().len();
                if index < offset + width {
                    return ::quarry_core::Record::read_property(&self.#ident, index - offset);
                }
                offset += width;
            });
            writes.push(quote! {
                let width = <#ty as ::quarry_core::Record>::descriptor().len();
                if index < offset + width {
                    return ::quarry_core::Record::write_property(
                        &mut self.#ident,
                        index - offset,
                        value,
                    );
                }
                offset += width;
            });
        } else {
            let null_reset = field.attrs.nullable.then(|| {
                quote! {
                    if value.is_null() && !<#ty as ::quarry_core::FieldType>::NULLABLE {
                        self.#ident = ::core::default::Default::default();
                        return ::core::result::Result::Ok(());
                    }
                }
            });
            reads.push(quote! {
                if index == offset {
                    return ::core::option::Option::Some(::quarry_core::ToSqlValue::to_sql_value(
                        ::core::clone::Clone::clone(&self.#ident),
                    ));
                }
                offset += 1;
            });
            writes.push(quote! {
                if index == offset {
                    #null_reset
                    self.#ident = ::quarry_core::FromSqlValue::from_sql_value(value)?;
                    return ::core::result::Result::Ok(());
                }
                offset += 1;
            });
        }
    }
    (reads, writes)
}

struct FieldInfo {
    ident: Ident,
    ty: Type,
    column: String,
    attrs: ColumnAttrs,
}

#[derive(Default)]
struct RecordAttrs {
    table: Option<String>,
    accept_changes: Option<String>,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    key: bool,
    identity: bool,
    nullable: bool,
    decompose: bool,
    not_mapped: bool,
    ignore_on_insert: bool,
    ignore_on_update: bool,
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    if let Expr::Lit(lit) = &value {
        if let Lit::Str(s) = &lit.lit {
            return Ok(s.value());
        }
    }
    Err(syn::Error::new_spanned(value, "expected a string literal"))
}

fn parse_record_attrs(attrs: &[Attribute]) -> syn::Result<RecordAttrs> {
    let mut result = RecordAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                result.table = Some(string_value(&meta)?);
            } else if meta.path.is_ident("accept_changes") {
                result.accept_changes = Some(string_value(&meta)?);
            } else {
                return Err(meta.error("unknown record attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        // Handle empty attribute like #[column]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                result.name = Some(string_value(&meta)?);
            } else if meta.path.is_ident("key") {
                result.key = true;
            } else if meta.path.is_ident("identity") {
                result.identity = true;
            } else if meta.path.is_ident("nullable") {
                result.nullable = true;
            } else if meta.path.is_ident("decompose") {
                result.decompose = true;
            } else if meta.path.is_ident("not_mapped") {
                result.not_mapped = true;
            } else if meta.path.is_ident("ignore_on_insert") {
                result.ignore_on_insert = true;
            } else if meta.path.is_ident("ignore_on_update") {
                result.ignore_on_update = true;
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}
