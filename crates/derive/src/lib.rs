extern crate proc_macro;

mod helpers;

use heck::SnakeCase;
use helpers::*;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, DeriveInput, FieldsNamed, Ident, Type};
use thiserror::Error;

const INDEX_ATTRIBUTE: &str = "index";
const IGNORE_IN_ALL_PARAMS_ATTRIBUTE: &str = "ignore_in_all_params";
const TABLE_NAME_ATTRIBUTE: &str = "table_name";
const ORDER_BY_ATTRIBUTE: &str = "order_by";

#[derive(Error, Debug)]
enum MacroError {
    #[error("the Model derive can only be used on structs")]
    NotAStruct(Span),
    #[error("the Model derive can only be used on structs with named fields")]
    NoNamedFields(Span),
    #[error("field has no identifier")]
    NoIdentOnField(Span),
    #[error("expected a string literal")]
    ExpectedStringLiteral(Span),
    #[error(transparent)]
    SynError(#[from] syn::Error),
}

#[derive(Debug)]
struct MacroField {
    is_index: bool,
    is_ignored: bool,
    ident: Ident,
    ty: Type,
}

/// Derives SQL statement builders and a row mapper for a store model struct.
///
/// The generated statements use named parameters matching the struct's field names. The table name
/// is the struct's name in snake_case unless overridden with `#[table_name = "..."]`. Fields marked
/// `#[index]` form the `WHERE` clause of the `select`, `update` and `delete` statements. Fields
/// marked `#[ignore_in_all_params]` (typically autoincrement row IDs) are left out of every
/// parameter list and written statement. `#[order_by = "..."]` appends an `ORDER BY` clause to the
/// select statements.
#[proc_macro_derive(Model, attributes(index, ignore_in_all_params, table_name, order_by))]
pub fn model(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let output = match run_macro(input) {
        Ok(token_stream) => token_stream,
        Err(err) => match err {
            MacroError::NoNamedFields(span)
            | MacroError::NotAStruct(span)
            | MacroError::NoIdentOnField(span)
            | MacroError::ExpectedStringLiteral(span) => {
                syn::Error::new(span, err.to_string()).to_compile_error()
            }
            MacroError::SynError(err) => err.to_compile_error(),
        },
    };

    proc_macro::TokenStream::from(output)
}

fn run_macro(input: DeriveInput) -> Result<TokenStream, MacroError> {
    let fields = get_fields(&input)?;
    let ident = &input.ident;
    let table_name = get_attribute_value(&input.attrs, TABLE_NAME_ATTRIBUTE)?
        .unwrap_or_else(|| ident.to_string().to_snake_case());
    let order_by = get_attribute_value(&input.attrs, ORDER_BY_ATTRIBUTE)?;

    let macro_fields = parse_fields(fields)?;

    let select = select_clause(&table_name, &macro_fields, order_by.as_deref());
    let select_all = select_all_clause(&table_name, order_by.as_deref());
    let replace_into = replace_into_clause(&table_name, &macro_fields);
    let insert = insert_into_clause(&table_name, &macro_fields);
    let update = update_clause(&table_name, &macro_fields);
    let delete = delete_clause(&table_name, &macro_fields);

    let select_params = select_params_fn(&macro_fields);
    let all_params = all_params_fn(&macro_fields);
    let from_row = from_row_impl(ident, &macro_fields);

    Ok(quote!(
        impl #ident {
            #select_params

            #all_params

            pub fn select() -> &'static str {
                #select
            }

            pub fn select_all() -> &'static str {
                #select_all
            }

            pub fn replace_into() -> &'static str {
                #replace_into
            }

            pub fn insert_into() -> &'static str {
                #insert
            }

            pub fn update() -> &'static str {
                #update
            }

            pub fn delete() -> &'static str {
                #delete
            }
        }

        #from_row
    ))
}

fn parse_fields(fields: &FieldsNamed) -> Result<Vec<MacroField>, MacroError> {
    let mut macro_fields = Vec::new();

    for field in &fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| MacroError::NoIdentOnField(field.span()))?;
        let ty = field.ty.clone();

        macro_fields.push(MacroField {
            is_index: has_attribute(&field.attrs, INDEX_ATTRIBUTE),
            is_ignored: has_attribute(&field.attrs, IGNORE_IN_ALL_PARAMS_ATTRIBUTE),
            ident,
            ty,
        });
    }

    Ok(macro_fields)
}

fn select_clause(table_name: &str, fields: &[MacroField], order_by: Option<&str>) -> String {
    // SELECT * FROM modules WHERE repo_id = :repo_id AND module_name = :module_name
    let mut conditions = Vec::new();

    for field in fields {
        if !field.is_index {
            continue;
        }

        conditions.push(sql_equals(&field.ident.to_string()));
    }

    let mut clause = format!(
        "SELECT * FROM {} WHERE {}",
        table_name,
        conditions.join(" AND ")
    );

    if let Some(order_by) = order_by {
        clause.push_str(&format!(" ORDER BY {}", order_by));
    }

    clause
}

fn select_all_clause(table_name: &str, order_by: Option<&str>) -> String {
    // SELECT * FROM repositories
    let mut clause = format!("SELECT * FROM {}", table_name);

    if let Some(order_by) = order_by {
        clause.push_str(&format!(" ORDER BY {}", order_by));
    }

    clause
}

fn replace_into_clause(table_name: &str, fields: &[MacroField]) -> String {
    // REPLACE INTO release_authors (release_id, ordinal, author) VALUES (:release_id, :ordinal,
    // :author)
    let mut field_names = Vec::new();
    let mut values = Vec::new();

    for field in fields {
        if field.is_ignored {
            continue;
        }

        let ident = field.ident.to_string();
        values.push(sql_parameter(&ident));
        field_names.push(ident);
    }

    format!(
        "REPLACE INTO {} ({}) VALUES ({})",
        table_name,
        field_names.join(", "),
        values.join(", "),
    )
}

fn insert_into_clause(table_name: &str, fields: &[MacroField]) -> String {
    // INSERT INTO modules (download_count) VALUES (:download_count)
    let mut field_names = Vec::new();
    let mut values = Vec::new();

    for field in fields {
        if field.is_index || field.is_ignored {
            continue;
        }

        let ident = field.ident.to_string();
        values.push(sql_parameter(&ident));
        field_names.push(ident);
    }

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_name,
        field_names.join(", "),
        values.join(", "),
    )
}

fn update_clause(table_name: &str, fields: &[MacroField]) -> String {
    // UPDATE modules SET download_count = :download_count WHERE repo_id = :repo_id AND module_name
    // = :module_name
    let mut updates = Vec::new();
    let mut conditions = Vec::new();

    for field in fields {
        if field.is_ignored {
            continue;
        }

        let ident = field.ident.to_string();

        if field.is_index {
            conditions.push(sql_equals(&ident));
        } else {
            updates.push(sql_equals(&ident));
        }
    }

    format!(
        "UPDATE {} SET {} WHERE {}",
        table_name,
        updates.join(", "),
        conditions.join(" AND "),
    )
}

fn delete_clause(table_name: &str, fields: &[MacroField]) -> String {
    // DELETE FROM release_authors WHERE release_id = :release_id
    let mut conditions = Vec::new();

    for field in fields {
        if !field.is_index {
            continue;
        }

        conditions.push(sql_equals(&field.ident.to_string()));
    }

    format!(
        "DELETE FROM {} WHERE {}",
        table_name,
        conditions.join(" AND "),
    )
}

fn select_params_fn(fields: &[MacroField]) -> TokenStream {
    let mut fn_params = Vec::new();
    let mut sql_params = Vec::new();

    for field in fields {
        if !field.is_index {
            continue;
        }

        let ident = &field.ident;
        let ty = &field.ty;
        let sql_param = sql_parameter(&ident.to_string());

        fn_params.push(quote!(#ident: &'a #ty));
        sql_params.push(quote!((#sql_param, #ident as &dyn ::rusqlite::ToSql)));
    }

    // &[(":repo_id", &repo_id as &dyn ::rusqlite::ToSql)]
    quote!(
        pub fn select_params<'a>(#(#fn_params),*) -> Vec<(&'static str, &'a dyn ::rusqlite::ToSql)> {
            vec![#(#sql_params),*]
        }
    )
}

fn all_params_fn(fields: &[MacroField]) -> TokenStream {
    let mut sql_params = Vec::new();

    for field in fields {
        if field.is_ignored {
            continue;
        }

        let ident = &field.ident;
        let sql_param = sql_parameter(&ident.to_string());

        sql_params.push(quote!((#sql_param, &self.#ident as &dyn ::rusqlite::ToSql)));
    }

    quote!(
        pub fn all_params(&self) -> Vec<(&'static str, &dyn ::rusqlite::ToSql)> {
            vec![#(#sql_params),*]
        }
    )
}

fn from_row_impl(ident: &Ident, fields: &[MacroField]) -> TokenStream {
    let mut field_mappings = Vec::new();

    for field in fields {
        let field_ident = &field.ident;
        let column_name = field_ident.to_string();

        field_mappings.push(quote!(#field_ident: row.get_unwrap(#column_name)));
    }

    quote!(
        impl ::std::convert::From<&::rusqlite::Row<'_>> for #ident {
            fn from(row: &::rusqlite::Row<'_>) -> Self {
                Self {
                    #(#field_mappings),*
                }
            }
        }
    )
}
