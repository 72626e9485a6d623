//! Attribute macro for harness test workers.
//!
//! `#[test_worker]` is applied to an inherent `impl` block. It collects the functions marked as test methods and
//! emits a `worker_harness::TestWorker` implementation whose method table maps each method name to its function,
//! so the worker can dispatch by the name it receives in its deployment configuration.
//!
//! # Example
//! ```ignore
//! #[derive(Default)]
//! struct Cache { store: Store }
//!
//! #[test_worker]
//! impl Cache {
//!     #[before]
//!     fn open(&mut self, ctx: &WorkerContext) { self.store.open(); }
//!
//!     #[test_method]
//!     fn test_get(&mut self, ctx: &WorkerContext) { ctx.asserter().assert_eq(None, self.store.get("k")); }
//!
//!     #[test_method(explicit)]
//!     fn test_expiry(&mut self, ctx: &WorkerContext) { /* calls ctx.asserter().test_complete() later */ }
//! }
//! ```
//!
//! Recognised markers on methods:
//! - `#[test_method]`: completes when the method returns.
//! - `#[test_method(explicit)]`: completes only when the worker calls `test_complete()` or fails.
//! - `#[before]` / `#[after]`: run when the worker is deployed / undeployed (at most one of each).
//!
//! The worker type must implement `Default`. `#[test_worker(name = "...")]` overrides the unit name used to
//! deploy it (the type name by default).

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Expr, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, Lit, MetaNameValue, Token, parse_macro_input};

enum Marker {
    Test { explicit: bool },
    Before,
    After,
}

fn take_marker(method: &mut ImplItemFn) -> syn::Result<Option<Marker>> {
    let mut marker = None;
    let mut kept = Vec::with_capacity(method.attrs.len());
    for attr in method.attrs.drain(..) {
        let found = if attr.path().is_ident("test_method") {
            let explicit = match &attr.meta {
                syn::Meta::Path(_) => false,
                _ => {
                    let mode: Ident = attr.parse_args()?;
                    if mode != "explicit" {
                        return Err(syn::Error::new(mode.span(), "expected `explicit`"));
                    }
                    true
                }
            };
            Some(Marker::Test { explicit })
        } else if attr.path().is_ident("before") {
            Some(Marker::Before)
        } else if attr.path().is_ident("after") {
            Some(Marker::After)
        } else {
            kept.push(attr);
            None
        };
        if let Some(found) = found {
            if marker.is_some() {
                return Err(syn::Error::new(method.sig.ident.span(), "a method can carry only one harness marker"));
            }
            marker = Some(found);
        }
    }
    method.attrs = kept;
    Ok(marker)
}

fn check_signature(method: &ImplItemFn) -> syn::Result<()> {
    let inputs = &method.sig.inputs;
    let receiver_ok = matches!(
        inputs.first(),
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_some()
    );
    if !receiver_ok || inputs.len() != 2 {
        return Err(syn::Error::new(
            method.sig.ident.span(),
            "harness methods must have the signature `fn(&mut self, &WorkerContext)`",
        ));
    }
    Ok(())
}

fn unit_name(args: &Punctuated<MetaNameValue, Token![,]>) -> syn::Result<Option<String>> {
    let Some(arg) = args.first() else { return Ok(None) };
    if args.len() > 1 || !arg.path.is_ident("name") {
        return Err(syn::Error::new_spanned(&arg.path, "expected a single `name = \"...\"` argument"));
    }
    match &arg.value {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => Ok(Some(s.value())),
            _ => Err(syn::Error::new_spanned(&arg.value, "`name` must be a string literal")),
        },
        _ => Err(syn::Error::new_spanned(&arg.value, "`name` must be a string literal")),
    }
}

fn expand(args: Punctuated<MetaNameValue, Token![,]>, mut item: ItemImpl) -> syn::Result<proc_macro2::TokenStream> {
    if item.trait_.is_some() {
        return Err(syn::Error::new(Span::call_site(), "#[test_worker] must be applied to an inherent impl block"));
    }
    let name = unit_name(&args)?;

    let mut tests = Vec::new();
    let mut before: Option<Ident> = None;
    let mut after: Option<Ident> = None;

    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else { continue };
        let Some(marker) = take_marker(method)? else { continue };
        check_signature(method)?;
        let ident = method.sig.ident.clone();
        match marker {
            Marker::Test { explicit } => tests.push((ident, explicit)),
            Marker::Before if before.is_none() => before = Some(ident),
            Marker::After if after.is_none() => after = Some(ident),
            Marker::Before | Marker::After => {
                return Err(syn::Error::new(ident.span(), "only one #[before] and one #[after] hook is allowed"));
            }
        }
    }

    let self_ty = &item.self_ty;
    let entries = tests.iter().map(|(ident, explicit)| {
        let name = ident.to_string();
        let mode = if *explicit {
            quote!(::worker_harness::Completion::Explicit)
        } else {
            quote!(::worker_harness::Completion::OnReturn)
        };
        quote! {
            .with(#name, #mode, |worker: &mut Self, ctx: &::worker_harness::WorkerContext| {
                ::worker_harness::MethodReturn::into_method_result(worker.#ident(ctx))
            })
        }
    });
    let unit_name = name.map(|n| {
        quote! {
            fn unit_name() -> &'static str {
                #n
            }
        }
    });
    let start = before.map(|ident| {
        quote! {
            fn start(&mut self, ctx: &::worker_harness::WorkerContext) {
                self.#ident(ctx);
            }
        }
    });
    let stop = after.map(|ident| {
        quote! {
            fn stop(&mut self, ctx: &::worker_harness::WorkerContext) {
                self.#ident(ctx);
            }
        }
    });

    Ok(quote! {
        #item

        impl ::worker_harness::TestWorker for #self_ty {
            #unit_name

            fn create(_ctx: &::worker_harness::WorkerContext) -> Self {
                <Self as ::core::default::Default>::default()
            }

            fn methods() -> ::worker_harness::MethodTable<Self> {
                ::worker_harness::MethodTable::new()
                    #(#entries)*
            }

            #start
            #stop
        }
    })
}

/// Generate the `TestWorker` implementation for an impl block of test methods.
#[proc_macro_attribute]
pub fn test_worker(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<MetaNameValue, Token![,]>::parse_terminated);
    let item = parse_macro_input!(input as ItemImpl);
    expand(args, item).unwrap_or_else(syn::Error::into_compile_error).into()
}
