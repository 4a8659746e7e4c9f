use proc_macro2::Span;
use syn::parse::ParseStream;

use crate::attr::attr_util;

/// One `name` or `name = literal` inside `#[rowgraph(..)]`.
pub struct Arg {
    pub ident: syn::Ident,
    pub value: Option<syn::Lit>,
}

impl syn::parse::Parse for Arg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let ident: syn::Ident = input.parse()?;

        let value = if input.peek(syn::Token![=]) {
            let _eq: syn::Token![=] = input.parse()?;
            Some(input.parse()?)
        } else {
            None
        };

        Ok(Self { ident, value })
    }
}

impl Arg {
    fn span(&self) -> Span {
        self.ident.span()
    }

    fn flag(&self) -> syn::Result<bool> {
        match &self.value {
            None => Ok(true),
            Some(syn::Lit::Bool(lit)) => Ok(lit.value),
            Some(lit) => Err(syn::Error::new(lit.span(), "Expected a bool")),
        }
    }

    /// `id` alone is ordinal 0, `id = 2` is ordinal 2.
    fn ordinal(&self) -> syn::Result<u16> {
        match &self.value {
            None => Ok(0),
            Some(syn::Lit::Int(lit)) => lit.base10_parse(),
            Some(lit) => Err(syn::Error::new(lit.span(), "Expected an ordinal")),
        }
    }

    fn string(&self) -> syn::Result<syn::LitStr> {
        match &self.value {
            Some(syn::Lit::Str(lit)) => Ok(lit.clone()),
            _ => Err(syn::Error::new(
                self.span(),
                format!("Expected {} = \"..\"", self.ident),
            )),
        }
    }

    fn int(&self) -> syn::Result<usize> {
        match &self.value {
            Some(syn::Lit::Int(lit)) => lit.base10_parse(),
            _ => Err(syn::Error::new(
                self.span(),
                format!("Expected {} = <index>", self.ident),
            )),
        }
    }
}

#[derive(Default)]
pub struct FieldOptions {
    pub identity: Option<u16>,
    pub parent_reference: Option<u16>,
    pub children: bool,
    pub object: bool,
    pub scalar: bool,
    pub column: Option<syn::LitStr>,
    pub readonly: bool,
    pub skip: bool,
    pub recordset: Option<usize>,
}

impl FieldOptions {
    pub fn from_attrs(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();

        for arg in attr_util::rowgraph_args(attrs)? {
            match arg.ident.to_string().as_str() {
                "id" => options.identity = Some(arg.ordinal()?),
                "parent_id" => options.parent_reference = Some(arg.ordinal()?),
                "children" => options.children = arg.flag()?,
                "object" => options.object = arg.flag()?,
                "scalar" => options.scalar = arg.flag()?,
                "column" => options.column = Some(arg.string()?),
                "readonly" => options.readonly = arg.flag()?,
                "skip" => options.skip = arg.flag()?,
                "recordset" => options.recordset = Some(arg.int()?),
                other => {
                    return Err(syn::Error::new(
                        arg.span(),
                        format!("Unrecognized field option `{}`", other),
                    ))
                }
            }
        }

        Ok(options)
    }
}

#[derive(Default)]
pub struct RecordOptions {
    pub name: Option<syn::LitStr>,
}

impl RecordOptions {
    pub fn from_attrs(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();

        for arg in attr_util::rowgraph_args(attrs)? {
            match arg.ident.to_string().as_str() {
                "name" => options.name = Some(arg.string()?),
                other => {
                    return Err(syn::Error::new(
                        arg.span(),
                        format!("Unrecognized record option `{}`", other),
                    ))
                }
            }
        }

        Ok(options)
    }
}
