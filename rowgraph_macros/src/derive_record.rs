use proc_macro2::{Literal, TokenStream};
use quote::quote;
use syn::parse::ParseStream;
use syn::spanned::Spanned;

use crate::attr::rowgraph::RecordOptions;
use crate::field::{Field, Kind};

pub struct RecordStruct {
    pub ident: syn::Ident,
    pub name: syn::LitStr,
    pub field_results: Vec<syn::Result<Option<Field>>>,
}

impl syn::parse::Parse for RecordStruct {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let input: syn::DeriveInput = input.parse()?;

        if !input.generics.params.is_empty() {
            return Err(syn::Error::new(
                input.ident.span(),
                "Generic records are not supported",
            ));
        }

        let fields = match &input.data {
            syn::Data::Struct(syn::DataStruct {
                fields: syn::Fields::Named(fields),
                ..
            }) => fields,
            _ => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "Expected a struct with named fields",
                ))
            }
        };

        let options = RecordOptions::from_attrs(&input.attrs)?;
        let name = options
            .name
            .unwrap_or_else(|| syn::LitStr::new(&input.ident.to_string(), input.ident.span()));

        let field_results = fields.named.iter().map(Field::try_from).collect();

        Ok(Self {
            ident: input.ident,
            name,
            field_results,
        })
    }
}

pub fn gen_record(record: RecordStruct) -> TokenStream {
    let mut fields = vec![];
    let mut errors = vec![];

    for result in record.field_results {
        match result {
            Ok(Some(field)) => fields.push(field),
            Ok(None) => {}
            Err(err) => errors.push(err.to_compile_error()),
        }
    }

    if !errors.is_empty() {
        return quote! {
            #(#errors)*
        };
    }

    let ident = &record.ident;
    let name = &record.name;

    let members = fields.iter().map(gen_member);

    let indexed = fields
        .iter()
        .enumerate()
        .map(|(index, field)| (Literal::usize_unsuffixed(index), field))
        .collect::<Vec<_>>();

    let set_value_arms = indexed
        .iter()
        .filter(|(_, field)| field.is_scalar() && field.settable())
        .map(|(index, field)| {
            let field_ident = &field.ident;
            let member_name = field.name();
            quote! {
                #index => {
                    self.#field_ident = ::rowgraph::record::convert(value, #name, #member_name)?;
                    Ok(())
                }
            }
        });

    let get_value_arms = indexed
        .iter()
        .filter(|(_, field)| field.is_scalar())
        .map(|(index, field)| {
            let field_ident = &field.ident;
            quote! {
                #index => Ok(::rowgraph::value::ToValue::to_value(&self.#field_ident)),
            }
        });

    let set_object_arms = indexed
        .iter()
        .filter(|(_, field)| field.settable())
        .filter_map(|(index, field)| match &field.kind {
            Kind::Object { target, boxed } => Some((index, field, target, *boxed)),
            _ => None,
        })
        .map(|(index, field, target, boxed)| {
            let field_ident = &field.ident;
            let wrap = if boxed {
                quote! { .map(::std::boxed::Box::new) }
            } else {
                quote! {}
            };
            quote! {
                #index => {
                    self.#field_ident = ::rowgraph::record::downcast_object::<#target>(object)? #wrap;
                    Ok(())
                }
            }
        });

    let object_arms = indexed.iter().filter_map(|(index, field)| {
        let field_ident = &field.ident;
        let borrow = match &field.kind {
            Kind::Object { boxed: true, .. } => quote! { as_deref },
            Kind::Object { boxed: false, .. } => quote! { as_ref },
            _ => return None,
        };
        Some(quote! {
            #index => self
                .#field_ident
                .#borrow()
                .map(|object| object as &dyn ::rowgraph::record::AnyRecord),
        })
    });

    let set_children_arms = indexed
        .iter()
        .filter(|(_, field)| field.settable())
        .filter_map(|(index, field)| match &field.kind {
            Kind::Collection { target } => {
                let field_ident = &field.ident;
                Some(quote! {
                    #index => {
                        self.#field_ident = ::rowgraph::record::downcast_children::<#target>(children)?;
                        Ok(())
                    }
                })
            }
            _ => None,
        });

    let set_shared_arms = indexed
        .iter()
        .filter(|(_, field)| field.settable())
        .filter_map(|(index, field)| match &field.kind {
            Kind::Shared { target } => {
                let field_ident = &field.ident;
                Some(quote! {
                    #index => {
                        self.#field_ident = ::rowgraph::record::downcast_shared::<#target>(shared)?;
                        Ok(())
                    }
                })
            }
            _ => None,
        });

    let unsupported = quote! {
        _ => Err(::rowgraph::record::unsupported(
            <Self as ::rowgraph::record::Record>::shape(),
            member,
        )),
    };

    quote! {
        impl ::rowgraph::record::Record for #ident {
            fn shape() -> &'static ::rowgraph::record::Shape {
                static SHAPE: ::std::sync::OnceLock<::rowgraph::record::Shape> =
                    ::std::sync::OnceLock::new();

                SHAPE.get_or_init(|| {
                    ::rowgraph::record::Shape::new::<#ident>(#name, vec![#(#members),*])
                })
            }
        }

        impl ::rowgraph::record::Access for #ident {
            #[allow(unused_variables)]
            fn set_value(
                &mut self,
                member: usize,
                value: ::rowgraph::value::Value,
            ) -> ::rowgraph::RowGraphResult<()> {
                match member {
                    #(#set_value_arms)*
                    #unsupported
                }
            }

            fn get_value(&self, member: usize) -> ::rowgraph::RowGraphResult<::rowgraph::value::Value> {
                match member {
                    #(#get_value_arms)*
                    #unsupported
                }
            }

            #[allow(unused_variables)]
            fn set_object(
                &mut self,
                member: usize,
                object: ::std::option::Option<::std::boxed::Box<dyn ::rowgraph::record::AnyRecord>>,
            ) -> ::rowgraph::RowGraphResult<()> {
                match member {
                    #(#set_object_arms)*
                    #unsupported
                }
            }

            fn object(&self, member: usize) -> ::std::option::Option<&dyn ::rowgraph::record::AnyRecord> {
                match member {
                    #(#object_arms)*
                    _ => None,
                }
            }

            #[allow(unused_variables)]
            fn set_children(
                &mut self,
                member: usize,
                children: ::std::vec::Vec<::std::boxed::Box<dyn ::rowgraph::record::AnyRecord>>,
            ) -> ::rowgraph::RowGraphResult<()> {
                match member {
                    #(#set_children_arms)*
                    #unsupported
                }
            }

            #[allow(unused_variables)]
            fn set_shared(
                &mut self,
                member: usize,
                shared: ::std::option::Option<
                    ::std::sync::Arc<dyn ::std::any::Any + ::std::marker::Send + ::std::marker::Sync>,
                >,
            ) -> ::rowgraph::RowGraphResult<()> {
                match member {
                    #(#set_shared_arms)*
                    #unsupported
                }
            }
        }
    }
}

fn gen_member(field: &Field) -> TokenStream {
    let name = field.name();
    let options = &field.options;

    let constructor = match &field.kind {
        Kind::Scalar => quote! { ::rowgraph::record::Member::scalar(#name) },
        Kind::Object { target, .. } => quote! {
            ::rowgraph::record::Member::object(#name, <#target as ::rowgraph::record::Record>::shape)
        },
        Kind::Collection { target } => quote! {
            ::rowgraph::record::Member::collection(#name, <#target as ::rowgraph::record::Record>::shape)
        },
        Kind::Shared { target } => quote! {
            ::rowgraph::record::Member::shared(#name, <#target as ::rowgraph::record::Record>::shape)
        },
    };

    let column = options.column.as_ref().map(|column| quote! { .column(#column) });
    let read_only = options.readonly.then(|| quote! { .read_only() });
    let identity = options.identity.map(|ordinal| quote! { .identity(#ordinal) });
    let parent_reference = options
        .parent_reference
        .map(|ordinal| quote! { .parent_reference(#ordinal) });
    let child_collection = options.children.then(|| quote! { .child_collection() });
    let recordset = options.recordset.map(|index| quote! { .recordset(#index) });

    quote! {
        #constructor #column #read_only #identity #parent_reference #child_collection #recordset
    }
}
