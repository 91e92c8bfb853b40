//! # oxasm — x86/x86-64 assembler front end
//!
//! `oxasm` is the parsing core of an x86/x86-64 assembler: it turns a single
//! pre-processed, pre-tokenized source line into a structured [`Insn`]
//! record — label, prefix slots, mnemonic, operands with size overrides,
//! memory references, segment overrides and AVX-512 decorators, and (for the
//! `DB` family and `INCBIN`) a tree of extended data operands.
//!
//! The crate deliberately stops at the instruction record.  Lexing,
//! expression evaluation, symbol definition, float formatting and diagnostic
//! presentation are *host services*: the parser consumes them through the
//! [`Scan`], [`Eval`] and [`Host`] traits, so it can be embedded in any
//! assembler driver (or exercised in tests with small fixtures).
//!
//! ## Quick tour
//!
//! ```rust,ignore
//! let mut insn = Insn::default();
//! oxasm::parse_line(&mut scanner, &evaluator, &mut host, &mut insn);
//! assert_eq!(insn.label.as_deref(), Some("loop"));
//! ```
//!
//! The [`bytecode`] module holds the octal-coded VM vocabulary shared with
//! the `oxasm-tables` generator; the [`flags`] module holds the operand-flag
//! vocabulary shared with the generated template tables.
//!
//! ## Features
//!
//! - **Pure Rust** — `no_std` + `alloc`, no unsafe code.
//! - **Host-agnostic** — all external collaborators are trait seams.
//! - **Best-effort recovery** — parse errors skip to the next comma and
//!   keep going, reporting through the host's diagnostic sink.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// Operand flags, register numbers and byte-code values cross integer
// widths on nearly every line, always into a range the call site has
// already masked or checked, so clippy's cast lints stay off.  doc_markdown
// objects to x86 spellings (ModR/M, VEX.vvvv); uninlined_format_args and
// the remaining allowances match how the crate is written: positional
// format arguments, selective #[must_use], one deliberately long state
// machine in parser.rs, and Option/Result returns whose failure modes are
// described where they matter rather than in per-function # Errors blocks.
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

extern crate alloc;

/// Octal-coded encoding VM vocabulary shared with the table generator.
pub mod bytecode;
/// Diagnostics: spans, severities, warning classes.
pub mod error;
/// Extended-operand parser for the `DB` family and `INCBIN`.
pub mod extops;
/// Operand-flag, decorator-flag and effective-address-flag vocabularies.
pub mod flags;
/// Host-service seam: label definition, float/string conversion, globals.
pub mod host;
/// The instruction record and its parts.
pub mod insn;
/// Effective-address resolution from evaluated expression vectors.
pub mod mref;
/// The source-line parser state machine.
pub mod parser;
/// Register enumeration with class and size queries.
pub mod reg;
/// Token model and the rewindable scanner contract.
pub mod token;

/// Expression vectors and the evaluator contract.
pub mod expr;

// Re-exports
pub use error::{Diag, Severity, Span, WarnClass};
pub use expr::{EaHint, Eval, EvalHints, ExprTerm, RoundMode};
pub use flags::{DecoFlags, EaFlags, OpExtra, OpFlags};
pub use host::Host;
pub use insn::{ExtOp, ExtOpKind, FloatBytes, Insn, Opcode, Operand, PrefixKind, PrefixSlot, MAX_OPERANDS};
pub use parser::{parse_line, Cursor};
pub use reg::Register;
pub use token::{Scan, ScanState, SizeSpec, StrFunc, Token, TokenFlags, TokenKind};
