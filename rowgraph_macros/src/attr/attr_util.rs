use syn::punctuated::Punctuated;

use crate::attr::rowgraph::Arg;

pub fn attr_has_simple_ident(attr: &syn::Attribute, name: &str) -> bool {
    let path = &attr.path;
    if path.leading_colon.is_some() || path.segments.len() != 1 {
        return false;
    }

    match path.segments.last() {
        Some(segment) => segment.ident == name,
        None => false,
    }
}

/// All arguments of every `#[rowgraph(..)]` attribute in `attrs`.
pub fn rowgraph_args(attrs: &[syn::Attribute]) -> syn::Result<Vec<Arg>> {
    let mut args = vec![];

    for attr in attrs {
        if !attr_has_simple_ident(attr, "rowgraph") {
            continue;
        }

        let parsed = attr.parse_args_with(Punctuated::<Arg, syn::Token![,]>::parse_terminated)?;
        args.extend(parsed);
    }

    Ok(args)
}
