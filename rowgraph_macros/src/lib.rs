#![forbid(unsafe_code)]

extern crate proc_macro;

mod derive_record;
mod field;

mod attr {
    pub mod attr_util;
    pub mod rowgraph;
}

use proc_macro::TokenStream;

#[proc_macro_derive(Record, attributes(rowgraph))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let record_struct = syn::parse_macro_input!(input as derive_record::RecordStruct);

    let tokens = derive_record::gen_record(record_struct);

    TokenStream::from(tokens)
}
