use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident};

/// Derives `ObjectTraversal` for manifest types. Fields marked with
/// `#[skip]` are left untouched by the walker.
#[proc_macro_derive(ObjectTraversal, attributes(skip))]
pub fn derive_object_traversal(token_stream: TokenStream) -> TokenStream {
    let ast = syn::parse::<DeriveInput>(token_stream).unwrap();
    let name = &ast.ident;

    let body = match &ast.data {
        Data::Struct(data) => {
            let mut visits = vec![];
            for field in &data.fields {
                let skipped = field
                    .attrs
                    .iter()
                    .any(|attr| attr.path.segments[0].ident == "skip");
                if skipped {
                    continue;
                }

                let ident = field.ident.as_ref().unwrap();
                visits.push(quote! {
                    self.#ident.traverse(walker);
                });
            }

            visits
        }

        Data::Enum(data) => {
            let mut arms = vec![];
            for variant in &data.variants {
                let variant_name = &variant.ident;

                let arm = match &variant.fields {
                    Fields::Named(named) => {
                        let fields: Vec<Ident> = named
                            .named
                            .iter()
                            .map(|f| f.ident.as_ref().unwrap().clone())
                            .collect();

                        quote! {
                            #name::#variant_name { #(#fields),* } => {
                                #(#fields.traverse(walker);)*
                            }
                        }
                    }

                    Fields::Unnamed(unnamed) => {
                        let fields: Vec<_> = unnamed
                            .unnamed
                            .iter()
                            .enumerate()
                            .map(|(idx, _)| {
                                Ident::new(&format!("f{}", idx), proc_macro2::Span::call_site())
                            })
                            .collect();

                        quote! {
                            #name::#variant_name(#(#fields),*) => {
                                #(#fields.traverse(walker);)*
                            }
                        }
                    }

                    Fields::Unit => quote! {
                        #name::#variant_name => {}
                    },
                };

                arms.push(arm);
            }

            vec![quote! {
                match self {
                    #(#arms),*
                }
            }]
        }

        _ => vec![],
    };

    let expanded = quote! {
        impl ::crossforge_utils::ObjectTraversal for #name {
            fn traverse<W: ::crossforge_utils::ObjectWalker>(&mut self, walker: &mut W) {
                #(#body)*;
            }
        }
    };

    expanded.into()
}
