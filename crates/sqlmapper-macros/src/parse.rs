//! Parsing logic for the derive macros.
//!
//! This module extracts struct-level and field-level `#[sqlmapper(...)]`
//! attributes into `RecordDef`/`FieldDef`, and enum variants into `EnumDef`.

use proc_macro2::Span;
use syn::{Attribute, Data, DeriveInput, Error, Expr, Field, Fields, Ident, Lit, Result, Type, UnOp};

/// Parsed struct with `#[derive(Record)]`.
#[derive(Debug)]
pub struct RecordDef {
    pub name: Ident,
    /// Table name from `#[sqlmapper(table = "...")]`.
    pub table: Option<String>,
    /// Mapped fields; skipped fields are not listed.
    pub fields: Vec<FieldDef>,
}

/// Parsed field of a record.
#[derive(Debug)]
pub struct FieldDef {
    pub ident: Ident,
    /// Member name (field name unless `column = "..."` is given).
    pub member_name: String,
    pub ty: Type,
    pub identity: bool,
    pub auto_increment: bool,
    pub ignore: bool,
}

/// Parsed enum with `#[derive(SqlEnum)]`.
#[derive(Debug)]
pub struct EnumDef {
    pub name: Ident,
    pub variants: Vec<VariantDef>,
    /// Tuple variant holding undefined discriminants.
    pub other: Option<Ident>,
}

#[derive(Debug)]
pub struct VariantDef {
    pub ident: Ident,
    pub sql_name: String,
    pub discriminant: i32,
}

pub fn parse_record(input: &DeriveInput) -> Result<RecordDef> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let table = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, use SqlEnum for enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not unions",
            ));
        }
    };

    let identities: Vec<_> = fields.iter().filter(|f| f.identity).collect();
    if identities.len() > 1 {
        return Err(Error::new_spanned(
            &identities[1].ident,
            "only one field can be marked #[sqlmapper(identity)]",
        ));
    }

    Ok(RecordDef {
        name: input.ident.clone(),
        table,
        fields,
    })
}

/// Parse struct-level `#[sqlmapper(table = "...")]`.
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table = None;
    for attr in attrs {
        if !attr.path().is_ident("sqlmapper") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: syn::LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unknown sqlmapper struct attribute, expected `table`"))
            }
        })?;
    }
    Ok(table)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => {
            let mut out = Vec::new();
            for field in &named.named {
                if let Some(def) = parse_field(field)? {
                    out.push(def);
                }
            }
            Ok(out)
        }
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Record requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Record requires a struct with fields, not a unit struct",
        )),
    }
}

/// Parse a single field; `None` for `#[sqlmapper(skip)]`.
fn parse_field(field: &Field) -> Result<Option<FieldDef>> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut column = None;
    let mut identity = false;
    let mut auto_increment = None;
    let mut ignore = false;
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("sqlmapper") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("identity") {
                identity = true;
            } else if path.is_ident("auto_increment") {
                let value: syn::LitBool = meta.value()?.parse()?;
                auto_increment = Some(value.value);
            } else if path.is_ident("ignore") {
                ignore = true;
            } else if path.is_ident("skip") {
                skip = true;
            } else if path.is_ident("column") {
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    column = Some(lit_str.value());
                } else {
                    return Err(Error::new_spanned(
                        value,
                        "expected string literal for column name",
                    ));
                }
            } else {
                return Err(meta.error(
                    "unknown sqlmapper field attribute, expected one of: \
                     column, identity, auto_increment, ignore, skip",
                ));
            }
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }
    if auto_increment.is_some() && !identity {
        return Err(Error::new_spanned(
            &ident,
            "auto_increment requires #[sqlmapper(identity)]",
        ));
    }

    let member_name = column.unwrap_or_else(|| ident.to_string());
    Ok(Some(FieldDef {
        ident,
        member_name,
        ty: field.ty.clone(),
        identity,
        auto_increment: identity && auto_increment.unwrap_or(true),
        ignore,
    }))
}

pub fn parse_enum(input: &DeriveInput) -> Result<EnumDef> {
    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(
            input,
            "SqlEnum can only be derived for enums",
        ));
    };

    let mut variants = Vec::new();
    let mut other = None;
    let mut next = 0_i32;

    for variant in &data.variants {
        let mut rename = None;
        let mut is_other = false;
        for attr in &variant.attrs {
            if attr.path().is_ident("sqlmapper") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        let value: syn::LitStr = meta.value()?.parse()?;
                        rename = Some(value.value());
                        Ok(())
                    } else if meta.path.is_ident("other") {
                        is_other = true;
                        Ok(())
                    } else {
                        Err(meta.error("unknown sqlmapper variant attribute, expected `rename` or `other`"))
                    }
                })?;
            }
        }

        if is_other {
            let holds_i32 = matches!(&variant.fields, Fields::Unnamed(f)
                if f.unnamed.len() == 1 && is_i32(&f.unnamed[0].ty));
            if !holds_i32 || other.is_some() {
                return Err(Error::new_spanned(
                    variant,
                    "#[sqlmapper(other)] must mark exactly one variant of the form `Name(i32)`",
                ));
            }
            other = Some(variant.ident.clone());
            continue;
        }

        if !variant.fields.is_empty() {
            return Err(Error::new_spanned(
                variant,
                "SqlEnum variants must be unit variants, except the #[sqlmapper(other)] variant",
            ));
        }

        let discriminant = match &variant.discriminant {
            Some((_, expr)) => parse_discriminant(expr)?,
            None => next,
        };
        next = discriminant.wrapping_add(1);

        variants.push(VariantDef {
            ident: variant.ident.clone(),
            sql_name: rename.unwrap_or_else(|| variant.ident.to_string()),
            discriminant,
        });
    }

    Ok(EnumDef {
        name: input.ident.clone(),
        variants,
        other,
    })
}

fn parse_discriminant(expr: &Expr) -> Result<i32> {
    match expr {
        Expr::Lit(syn::ExprLit {
            lit: Lit::Int(int), ..
        }) => int.base10_parse(),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            parse_discriminant(&unary.expr).map(|v| -v)
        }
        other => Err(Error::new_spanned(
            other,
            "SqlEnum discriminants must be integer literals",
        )),
    }
}

fn is_i32(ty: &Type) -> bool {
    matches!(ty, Type::Path(p) if p.path.is_ident("i32"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parse_record_attrs() {
        let input: DeriveInput = parse_quote! {
            #[sqlmapper(table = "Members")]
            struct Member {
                #[sqlmapper(identity)]
                id: i64,
                #[sqlmapper(column = "FullName")]
                name: String,
                #[sqlmapper(ignore)]
                cached: i32,
                #[sqlmapper(skip)]
                scratch: Vec<String>,
            }
        };
        let def = parse_record(&input).unwrap();
        assert_eq!(def.table.as_deref(), Some("Members"));
        assert_eq!(def.fields.len(), 3);
        assert!(def.fields[0].identity && def.fields[0].auto_increment);
        assert_eq!(def.fields[1].member_name, "FullName");
        assert!(def.fields[2].ignore);
    }

    #[test]
    fn test_identity_without_auto_increment() {
        let input: DeriveInput = parse_quote! {
            struct Code {
                #[sqlmapper(identity, auto_increment = false)]
                code: String,
            }
        };
        let def = parse_record(&input).unwrap();
        assert!(def.fields[0].identity);
        assert!(!def.fields[0].auto_increment);
    }

    #[test]
    fn test_two_identities_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[sqlmapper(identity)]
                a: i32,
                #[sqlmapper(identity)]
                b: i32,
            }
        };
        assert!(parse_record(&input).is_err());
    }

    #[test]
    fn test_parse_enum_discriminants() {
        let input: DeriveInput = parse_quote! {
            enum Level {
                Low = -1,
                Mid,
                High = 10,
                #[sqlmapper(other)]
                Unknown(i32),
            }
        };
        let def = parse_enum(&input).unwrap();
        let values: Vec<_> = def.variants.iter().map(|v| v.discriminant).collect();
        assert_eq!(values, vec![-1, 0, 10]);
        assert_eq!(def.other.map(|i| i.to_string()), Some("Unknown".to_string()));
    }

    #[test]
    fn test_enum_data_variant_rejected() {
        let input: DeriveInput = parse_quote! {
            enum Bad {
                A,
                B(String),
            }
        };
        assert!(parse_enum(&input).is_err());
    }
}
