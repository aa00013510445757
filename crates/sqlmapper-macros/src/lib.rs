//! Procedural macros for sqlmapper.
//!
//! `sqlmapper-macros` is the **compile-time codegen layer**. It replaces
//! runtime reflection: every mapped struct gets a static member table and
//! indexed accessors that the descriptor registry, the row deserializer and
//! the parameter binder work through.
//!
//! - `#[derive(Record)]` implements `Record`, `FieldType` (so the struct can
//!   be nested in another record), `FromRow` and `ToParams`.
//! - `#[derive(SqlEnum)]` implements `SqlEnum`, `FieldType` and `FromRow`
//!   for enums stored as their integer discriminant.
//!
//! These macros are used by application crates via the `sqlmapper` facade.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

mod parse;

use parse::{EnumDef, RecordDef, parse_enum, parse_record};

/// Derive macro for the `Record` trait.
///
/// The struct must have named fields and implement `Default`. Member types
/// must implement `FieldType`: scalars, `Option<_>`, `Box<_>`, lists of
/// scalars, `SqlEnum` enums and other `Record` structs.
///
/// # Attributes
///
/// - `#[sqlmapper(table = "name")]` - Table used by entity operations
///   (defaults to the struct name)
/// - `#[sqlmapper(identity)]` - Mark the identity member
/// - `#[sqlmapper(auto_increment = false)]` - Identity assigned by the caller
/// - `#[sqlmapper(column = "name")]` - Override the member name
/// - `#[sqlmapper(ignore)]` - Exclude from generated entity SQL
/// - `#[sqlmapper(skip)]` - Not a member at all
///
/// # Example
///
/// ```ignore
/// use sqlmapper::Record;
///
/// #[derive(Debug, Default, Record)]
/// #[sqlmapper(table = "People")]
/// struct Person {
///     #[sqlmapper(identity)]
///     id: i64,
///     name: String,
///     address: Option<Address>,
/// }
/// ```
#[proc_macro_derive(Record, attributes(sqlmapper))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let record = match parse_record(&input) {
        Ok(r) => r,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_record_impl(&record).into()
}

/// Derive macro for the `SqlEnum` trait.
///
/// Variants map to their discriminant (explicit `= n`, otherwise the previous
/// value plus one, starting at zero). Column values may hold the integer or
/// the variant name in any case.
///
/// # Attributes
///
/// - `#[sqlmapper(rename = "name")]` - Name accepted when reading text
/// - `#[sqlmapper(other)]` - A `Name(i32)` variant holding undefined values;
///   without it, undefined values are a conversion error
///
/// # Example
///
/// ```ignore
/// use sqlmapper::SqlEnum;
///
/// #[derive(Debug, Default, SqlEnum)]
/// enum Status {
///     #[default]
///     Active = 1,
///     Retired,
/// }
/// ```
#[proc_macro_derive(SqlEnum, attributes(sqlmapper))]
pub fn derive_sql_enum(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    match parse_enum(&input) {
        Ok(def) => generate_sql_enum_impl(&def).into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn generate_record_impl(record: &RecordDef) -> TokenStream2 {
    let name = &record.name;
    let name_str = name.to_string();
    let table = match &record.table {
        Some(t) => quote! { ::core::option::Option::Some(#t) },
        None => quote! { ::core::option::Option::None },
    };

    let members = record.fields.iter().map(|f| {
        let member_name = &f.member_name;
        let ty = &f.ty;
        let identity = f.identity;
        let auto_increment = f.auto_increment;
        let ignore = f.ignore;
        quote! {
            sqlmapper_core::MemberInfo {
                name: #member_name,
                type_name: ::std::any::type_name::<#ty>,
                kind: <#ty as sqlmapper_core::FieldType>::KIND,
                nullable: <#ty as sqlmapper_core::FieldType>::NULLABLE,
                nested: <#ty as sqlmapper_core::FieldType>::NESTED,
                identity: #identity,
                auto_increment: #auto_increment,
                ignore: #ignore,
            }
        }
    });

    let indices: Vec<usize> = (0..record.fields.len()).collect();
    let idents: Vec<_> = record.fields.iter().map(|f| &f.ident).collect();
    let types: Vec<_> = record.fields.iter().map(|f| &f.ty).collect();

    quote! {
        impl sqlmapper_core::Record for #name {
            fn record_info() -> &'static sqlmapper_core::RecordInfo {
                static INFO: sqlmapper_core::RecordInfo = sqlmapper_core::RecordInfo {
                    name: #name_str,
                    table: #table,
                    type_id: ::std::any::TypeId::of::<#name>,
                    members: &[#(#members),*],
                };
                &INFO
            }

            fn info(&self) -> &'static sqlmapper_core::RecordInfo {
                <Self as sqlmapper_core::Record>::record_info()
            }

            fn get(&self, index: usize) -> sqlmapper_core::Value {
                match index {
                    #(#indices => sqlmapper_core::FieldType::to_sql(&self.#idents),)*
                    _ => sqlmapper_core::Value::Null,
                }
            }

            fn set(
                &mut self,
                index: usize,
                value: &sqlmapper_core::Value,
            ) -> sqlmapper_core::Result<()> {
                match index {
                    #(#indices => {
                        self.#idents = <#types as sqlmapper_core::FieldType>::from_sql(value)?;
                        ::core::result::Result::Ok(())
                    })*
                    _ => ::core::result::Result::Err(sqlmapper_core::record::no_such_member(
                        <Self as sqlmapper_core::Record>::record_info(),
                        index,
                    )),
                }
            }

            fn nested_mut(
                &mut self,
                index: usize,
            ) -> ::core::option::Option<&mut dyn sqlmapper_core::Record> {
                match index {
                    #(#indices => sqlmapper_core::FieldType::as_record_mut(&mut self.#idents),)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl sqlmapper_core::FieldType for #name {
            const KIND: sqlmapper_core::FieldKind = sqlmapper_core::FieldKind::Nested;
            const NESTED: ::core::option::Option<fn() -> &'static sqlmapper_core::RecordInfo> =
                ::core::option::Option::Some(
                    <#name as sqlmapper_core::Record>::record_info
                        as fn() -> &'static sqlmapper_core::RecordInfo,
                );

            fn to_sql(&self) -> sqlmapper_core::Value {
                sqlmapper_core::Value::Null
            }

            fn from_sql(value: &sqlmapper_core::Value) -> sqlmapper_core::Result<Self> {
                ::core::result::Result::Err(sqlmapper_core::Error::Type(
                    sqlmapper_core::error::TypeError {
                        expected: #name_str,
                        actual: value.type_name().to_string(),
                        column: ::core::option::Option::None,
                        rust_type: ::core::option::Option::Some(::std::any::type_name::<Self>()),
                    },
                ))
            }

            fn as_record_mut(&mut self) -> ::core::option::Option<&mut dyn sqlmapper_core::Record> {
                ::core::option::Option::Some(self)
            }

            fn default_instance() -> ::core::option::Option<Self> {
                ::core::option::Option::Some(<Self as ::core::default::Default>::default())
            }
        }

        impl sqlmapper_core::FromRow for #name {
            fn deserializer(
                columns: &sqlmapper_core::ColumnInfo,
                registry: &sqlmapper_core::TypeRegistry,
            ) -> sqlmapper_core::Result<sqlmapper_core::Deserializer<Self>> {
                sqlmapper_core::record_deserializer::<Self>(columns, registry)
            }
        }

        impl sqlmapper_core::ToParams for #name {
            fn type_tag(&self) -> ::core::option::Option<sqlmapper_core::TypeTag> {
                ::core::option::Option::Some(sqlmapper_core::TypeTag::of::<Self>())
            }

            fn param_source(&self) -> ::core::option::Option<sqlmapper_core::ParamSource<'_>> {
                ::core::option::Option::Some(sqlmapper_core::ParamSource::Record(self))
            }
        }
    }
}

fn generate_sql_enum_impl(def: &EnumDef) -> TokenStream2 {
    let name = &def.name;
    let idents: Vec<_> = def.variants.iter().map(|v| &v.ident).collect();
    let names: Vec<_> = def.variants.iter().map(|v| v.sql_name.as_str()).collect();
    let discriminants: Vec<i32> = def.variants.iter().map(|v| v.discriminant).collect();

    let (other_to_arm, other_from_arm) = match &def.other {
        Some(other) => (
            quote! { #name::#other(value) => *value, },
            quote! { value => ::core::option::Option::Some(#name::#other(value)), },
        ),
        None => (quote! {}, quote! { _ => ::core::option::Option::None, }),
    };

    quote! {
        impl sqlmapper_core::SqlEnum for #name {
            const NAMES: &'static [&'static str] = &[#(#names),*];

            fn to_i32(&self) -> i32 {
                match self {
                    #(#name::#idents => #discriminants,)*
                    #other_to_arm
                }
            }

            fn from_i32(value: i32) -> ::core::option::Option<Self> {
                match value {
                    #(#discriminants => ::core::option::Option::Some(#name::#idents),)*
                    #other_from_arm
                }
            }

            fn from_name(name: &str) -> ::core::option::Option<Self> {
                #(
                    if name.eq_ignore_ascii_case(#names) {
                        return ::core::option::Option::Some(#name::#idents);
                    }
                )*
                ::core::option::Option::None
            }
        }

        impl sqlmapper_core::FieldType for #name {
            const KIND: sqlmapper_core::FieldKind = sqlmapper_core::FieldKind::Enum;

            fn to_sql(&self) -> sqlmapper_core::Value {
                sqlmapper_core::Value::Int(sqlmapper_core::SqlEnum::to_i32(self))
            }

            fn from_sql(value: &sqlmapper_core::Value) -> sqlmapper_core::Result<Self> {
                sqlmapper_core::enum_from_value::<Self>(value)
            }
        }

        impl sqlmapper_core::FromRow for #name {
            fn deserializer(
                _columns: &sqlmapper_core::ColumnInfo,
                _registry: &sqlmapper_core::TypeRegistry,
            ) -> sqlmapper_core::Result<sqlmapper_core::Deserializer<Self>> {
                ::core::result::Result::Ok(sqlmapper_core::scalar_deserializer::<Self>())
            }
        }

        impl ::core::convert::From<#name> for sqlmapper_core::Value {
            fn from(value: #name) -> Self {
                sqlmapper_core::Value::Int(sqlmapper_core::SqlEnum::to_i32(&value))
            }
        }
    }
}
