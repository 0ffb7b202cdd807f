use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Error, Fields, Ident, Result, Type};

use super::attrs::{AssociationAttrs, ColumnAttrs, FieldRole, Kind, parse_field, parse_model};
use crate::helpers::{is_named, unwrap_generic};
use crate::paths::{core as kiln, std as std_paths};

struct ColumnField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    column: String,
    attrs: ColumnAttrs,
}

enum ShapeKind {
    One,
    Optional,
    OptionalBoxed,
    Boxed,
    Many,
}

struct AssociationField<'a> {
    ident: &'a Ident,
    name: String,
    target: &'a Type,
    shape: ShapeKind,
    attrs: AssociationAttrs,
}

fn classify(ty: &Type) -> (ShapeKind, &Type) {
    if let Some(inner) = unwrap_generic(ty, "Vec") {
        return (ShapeKind::Many, inner);
    }
    if let Some(inner) = unwrap_generic(ty, "Option") {
        return match unwrap_generic(inner, "Box") {
            Some(target) => (ShapeKind::OptionalBoxed, target),
            None => (ShapeKind::Optional, inner),
        };
    }
    if let Some(inner) = unwrap_generic(ty, "Box") {
        return (ShapeKind::Boxed, inner);
    }
    (ShapeKind::One, ty)
}

fn lit_option(value: &Option<String>) -> TokenStream {
    let option = std_paths::option();
    match value {
        Some(v) => quote!(#option::Some(#v)),
        None => quote!(#option::None),
    }
}

pub(crate) fn derive_model(input: DeriveInput) -> Result<TokenStream> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Model cannot be derived for generic types",
        ));
    }
    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(Error::new_spanned(
                    ident,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => return Err(Error::new_spanned(ident, "Model can only be derived for structs")),
    };

    let model_attrs = parse_model(&input)?;
    let name = ident.to_string();
    let singular = name.to_snake_case();
    let table = model_attrs
        .table
        .clone()
        .unwrap_or_else(|| pluralizer::pluralize(&singular, 2, false));

    let mut columns = Vec::new();
    let mut associations = Vec::new();
    for field in named {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        match parse_field(field)? {
            FieldRole::Skip => {}
            FieldRole::Column(attrs) => columns.push(ColumnField {
                ident: field_ident,
                ty: &field.ty,
                column: attrs
                    .name
                    .clone()
                    .unwrap_or_else(|| field_ident.unraw().to_string()),
                attrs,
            }),
            FieldRole::Association(attrs) => {
                let (shape, target) = classify(&field.ty);
                let many = matches!(shape, ShapeKind::Many);
                let wants_many = matches!(attrs.kind, Kind::HasMany | Kind::ManyToMany);
                if many != wants_many {
                    return Err(Error::new_spanned(
                        &field.ty,
                        if wants_many {
                            "has_many and many_to_many fields must be a Vec<T>"
                        } else {
                            "belongs_to and has_one fields cannot be a Vec<T>"
                        },
                    ));
                }
                associations.push(AssociationField {
                    ident: field_ident,
                    name: field_ident.unraw().to_string(),
                    target,
                    shape,
                    attrs,
                });
            }
        }
    }

    if !columns.iter().any(|c| c.attrs.primary)
        && let Some(id) = columns.iter_mut().find(|c| c.column == "id")
    {
        id.attrs.primary = true;
    }
    if columns.iter().filter(|c| c.attrs.primary).count() > 1 {
        return Err(Error::new_spanned(ident, "only one column can be marked `primary`"));
    }

    let value = kiln::value();
    let to_value = kiln::to_value();
    let from_value = kiln::from_value();
    let result = kiln::result();
    let error = kiln::error();
    let model = kiln::model();
    let record = kiln::record();
    let model_def = kiln::model_def();
    let field_def = kiln::field_def();
    let association_def = kiln::association_def();
    let association_kind = kiln::association_kind();
    let shape_path = kiln::shape();
    let loaded = kiln::loaded();
    let new_record = kiln::new_record();
    let context = kiln::context();
    let option = std_paths::option();
    let boxed = std_paths::boxed();
    let any = std_paths::any();

    let field_defs = columns.iter().map(|c| {
        let field_name = c.ident.unraw().to_string();
        let column = &c.column;
        let select = lit_option(&c.attrs.select);
        let primary = c.attrs.primary;
        let readable = !c.attrs.writeonly;
        let writeable = !c.attrs.readonly && c.attrs.select.is_none();
        let generate = if primary && is_named(c.ty, "Uuid") {
            let generate_uuid = kiln::generate_uuid();
            quote!(#option::Some(#generate_uuid))
        } else {
            quote!(#option::None)
        };
        quote! {
            #field_def {
                field: #field_name,
                column: #column,
                select: #select,
                primary: #primary,
                readable: #readable,
                writeable: #writeable,
                generate: #generate,
            }
        }
    });
    let field_count = columns.len();

    let association_defs = associations.iter().map(|a| {
        let field_name = &a.name;
        let target = a.target;
        let kind = match a.attrs.kind {
            Kind::BelongsTo => quote!(#association_kind::BelongsTo),
            Kind::HasOne => quote!(#association_kind::HasOne),
            Kind::HasMany => quote!(#association_kind::HasMany),
            Kind::ManyToMany => quote!(#association_kind::ManyToMany),
        };
        let shape = match a.shape {
            ShapeKind::One => quote!(#shape_path::One),
            ShapeKind::Optional | ShapeKind::OptionalBoxed => quote!(#shape_path::Optional),
            ShapeKind::Boxed => quote!(#shape_path::Boxed),
            ShapeKind::Many => quote!(#shape_path::Many),
        };
        let foreign_key = lit_option(&a.attrs.foreign_key);
        let target_key = lit_option(&a.attrs.target_key);
        let through = lit_option(&a.attrs.through);
        let references = lit_option(&a.attrs.references);
        let order_by = lit_option(&a.attrs.order_by);
        quote! {
            #association_def {
                field: #field_name,
                kind: #kind,
                shape: #shape,
                target: <#target as #model>::model_def,
                foreign_key: #foreign_key,
                target_key: #target_key,
                through: #through,
                references: #references,
                order_by: #order_by,
            }
        }
    });
    let association_count = associations.len();

    let table_fn = match &model_attrs.table_fn {
        Some(path) => quote!(#option::Some(#path as fn(&#context) -> #result<::std::string::String>)),
        None => quote!(#option::None),
    };

    let getters = columns.iter().map(|c| {
        let field = c.ident;
        let column = &c.column;
        quote!(#column => #option::Some(#to_value::to_value(&self.#field)),)
    });
    let setters = columns.iter().map(|c| {
        let field = c.ident;
        let column = &c.column;
        quote!(#column => self.#field = #from_value::from_value(value)?,)
    });
    let assigners = associations.iter().map(|a| {
        let field = a.ident;
        let field_name = &a.name;
        let take = match a.shape {
            ShapeKind::One => quote!(loaded.into_one()?),
            ShapeKind::Optional => quote!(loaded.into_optional()?),
            ShapeKind::OptionalBoxed => quote!(loaded.into_optional()?.map(#boxed::new)),
            ShapeKind::Boxed => quote!(#boxed::new(loaded.into_one()?)),
            ShapeKind::Many => quote!(loaded.into_many()?),
        };
        quote!(#field_name => self.#field = #take,)
    });

    Ok(quote! {
        impl #model for #ident {
            fn model_def() -> &'static #model_def {
                static FIELDS: [#field_def; #field_count] = [#(#field_defs),*];
                static ASSOCIATIONS: [#association_def; #association_count] = [#(#association_defs),*];
                static DEF: #model_def = #model_def {
                    name: #name,
                    singular: #singular,
                    table: #table,
                    table_fn: #table_fn,
                    fields: &FIELDS,
                    associations: &ASSOCIATIONS,
                    new_record: #new_record::<#ident>,
                };
                &DEF
            }
        }

        impl #record for #ident {
            fn def(&self) -> &'static #model_def {
                <Self as #model>::model_def()
            }

            fn get(&self, column: &str) -> #option<#value> {
                match column {
                    #(#getters)*
                    _ => #option::None,
                }
            }

            #[allow(unused_variables, unreachable_code)]
            fn set(&mut self, column: &str, value: #value) -> #result<bool> {
                match column {
                    #(#setters)*
                    _ => return ::std::result::Result::Ok(false),
                }
                ::std::result::Result::Ok(true)
            }

            #[allow(unused_variables, unreachable_code)]
            fn assign(&mut self, field: &str, loaded: #loaded) -> #result<()> {
                match field {
                    #(#assigners)*
                    _ => {
                        return ::std::result::Result::Err(#error::UnknownAssociation {
                            field: field.to_owned(),
                            model: #name.to_owned(),
                        });
                    }
                }
                ::std::result::Result::Ok(())
            }

            fn boxed_clone(&self) -> #boxed<dyn #record> {
                #boxed::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn #any {
                self
            }

            fn into_any(self: #boxed<Self>) -> #boxed<dyn #any> {
                self
            }
        }
    })
}
