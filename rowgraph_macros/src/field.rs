use syn::spanned::Spanned;

use crate::attr::rowgraph::FieldOptions;

pub enum Kind {
    Scalar,
    Object { target: syn::Type, boxed: bool },
    Collection { target: syn::Type },
    Shared { target: syn::Type },
}

pub struct Field {
    pub ident: syn::Ident,
    pub kind: Kind,
    pub options: FieldOptions,
}

impl Field {
    /// `None` for a skipped field.
    pub fn try_from(field: &syn::Field) -> syn::Result<Option<Self>> {
        let span = field.span();
        let ident = match &field.ident {
            Some(ident) => ident.clone(),
            None => return Err(syn::Error::new(span, "Expected a named field")),
        };

        let options = FieldOptions::from_attrs(&field.attrs)?;
        if options.skip {
            return Ok(None);
        }

        let kind = classify(&field.ty, &options)?;
        validate(&kind, &options, ident.span())?;

        Ok(Some(Self {
            ident,
            kind,
            options,
        }))
    }

    /// Name the runtime knows the member by.
    pub fn name(&self) -> String {
        let name = self.ident.to_string();
        match name.strip_prefix("r#") {
            Some(stripped) => stripped.to_owned(),
            None => name,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, Kind::Scalar)
    }

    pub fn settable(&self) -> bool {
        !self.options.readonly
    }
}

fn classify(ty: &syn::Type, options: &FieldOptions) -> syn::Result<Kind> {
    if options.scalar {
        return Ok(Kind::Scalar);
    }

    if let Some(item) = single_generic(ty, "Vec") {
        if is_ident(item, "u8") {
            return Ok(Kind::Scalar);
        }
        return Ok(Kind::Collection {
            target: item.clone(),
        });
    }

    if let Some(inner) = single_generic(ty, "Option") {
        if let Some(target) = single_generic(inner, "Box") {
            return Ok(Kind::Object {
                target: target.clone(),
                boxed: true,
            });
        }
        if let Some(target) = single_generic(inner, "Arc") {
            return Ok(Kind::Shared {
                target: target.clone(),
            });
        }
        if options.object {
            return Ok(Kind::Object {
                target: inner.clone(),
                boxed: false,
            });
        }
        return Ok(Kind::Scalar);
    }

    if options.object {
        return Err(syn::Error::new(
            ty.span(),
            "Expected Option<T> for an object member",
        ));
    }

    Ok(Kind::Scalar)
}

fn validate(kind: &Kind, options: &FieldOptions, span: proc_macro2::Span) -> syn::Result<()> {
    let collection = matches!(kind, Kind::Collection { .. });
    let scalar = matches!(kind, Kind::Scalar);

    if (options.children || options.recordset.is_some()) && !collection {
        return Err(syn::Error::new(
            span,
            "children and recordset apply to Vec<T> members",
        ));
    }

    if (options.identity.is_some() || options.parent_reference.is_some() || options.column.is_some())
        && !scalar
    {
        return Err(syn::Error::new(
            span,
            "id, parent_id and column apply to scalar members",
        ));
    }

    if options.recordset == Some(0) {
        return Err(syn::Error::new(
            span,
            "recordset 0 holds the records themselves",
        ));
    }

    Ok(())
}

/// `T` of `Name<T>`, whatever path leads to `Name`.
fn single_generic<'t>(ty: &'t syn::Type, name: &str) -> Option<&'t syn::Type> {
    let path = match ty {
        syn::Type::Path(type_path) if type_path.qself.is_none() => &type_path.path,
        _ => return None,
    };

    let segment = path.segments.last()?;
    if segment.ident != name {
        return None;
    }

    let args = match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) if args.args.len() == 1 => args,
        _ => return None,
    };

    match args.args.first()? {
        syn::GenericArgument::Type(ty) => Some(ty),
        _ => None,
    }
}

fn is_ident(ty: &syn::Type, name: &str) -> bool {
    match ty {
        syn::Type::Path(type_path) => type_path.path.is_ident(name),
        _ => false,
    }
}
