//! Fully-qualified paths for generated code.
//!
//! Paths use the `kiln::` prefix without a leading `::`, so the facade crate
//! can refer to itself through `extern crate self as kiln`.

use proc_macro2::TokenStream;
use quote::quote;

pub mod std {
    use super::*;

    pub fn option() -> TokenStream {
        quote!(::std::option::Option)
    }

    pub fn boxed() -> TokenStream {
        quote!(::std::boxed::Box)
    }

    pub fn any() -> TokenStream {
        quote!(::std::any::Any)
    }
}

pub mod core {
    use super::*;

    pub fn value() -> TokenStream {
        quote!(kiln::core::value::Value)
    }

    pub fn to_value() -> TokenStream {
        quote!(kiln::core::value::ToValue)
    }

    pub fn from_value() -> TokenStream {
        quote!(kiln::core::value::FromValue)
    }

    pub fn result() -> TokenStream {
        quote!(kiln::core::error::Result)
    }

    pub fn error() -> TokenStream {
        quote!(kiln::core::error::KilnError)
    }

    pub fn model() -> TokenStream {
        quote!(kiln::core::model::Model)
    }

    pub fn record() -> TokenStream {
        quote!(kiln::core::model::Record)
    }

    pub fn model_def() -> TokenStream {
        quote!(kiln::core::model::ModelDef)
    }

    pub fn field_def() -> TokenStream {
        quote!(kiln::core::model::FieldDef)
    }

    pub fn association_def() -> TokenStream {
        quote!(kiln::core::model::AssociationDef)
    }

    pub fn association_kind() -> TokenStream {
        quote!(kiln::core::model::AssociationKind)
    }

    pub fn shape() -> TokenStream {
        quote!(kiln::core::model::Shape)
    }

    pub fn loaded() -> TokenStream {
        quote!(kiln::core::model::Loaded)
    }

    pub fn new_record() -> TokenStream {
        quote!(kiln::core::model::new_record)
    }

    pub fn context() -> TokenStream {
        quote!(kiln::core::context::Context)
    }

    pub fn generate_uuid() -> TokenStream {
        quote!(kiln::core::value::generate_uuid)
    }
}
