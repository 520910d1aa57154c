use log::trace;
use std::collections::HashMap;

use crate::{
    error::Error,
    framing::{Frame, FrameLayout},
    lock::LockParams,
    session::{Context, Status},
};

/// Message decoder of a [Protocol]
pub type Handler<P> = fn(&mut P, &Frame, &mut Context) -> Result<Status, Error>;

/// Receiver family binding: wire format, lock time interpretation
/// and message decoders. Implementors hold their own scratch state.
pub trait Protocol: Sized {
    /// Receiver family name
    const NAME: &'static str;
    /// Wire format
    const LAYOUT: FrameLayout;
    /// Lock time interpretation
    const LOCK: LockParams = LockParams::new(0.05, None);

    /// Supported messages: (code, name, decoder)
    fn handlers() -> Vec<(u16, &'static str, Handler<Self>)>;

    /// Human readable message code
    fn label(code: u16) -> String {
        code.to_string()
    }

    /// Interprets the header of every validated frame,
    /// supported or not, prior to dispatching.
    fn on_header(&mut self, frame: &Frame, ctx: &mut Context) -> Result<(), Error> {
        let _ = (frame, ctx);
        Ok(())
    }
}

/// Message code to decoder table, built once per session
pub struct Dispatcher<P> {
    table: HashMap<u16, (&'static str, Handler<P>)>,
}

impl<P: Protocol> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Protocol> Dispatcher<P> {
    pub fn new() -> Self {
        Self {
            table: P::handlers()
                .into_iter()
                .map(|(code, name, handler)| (code, (name, handler)))
                .collect(),
        }
    }

    /// Runs the decoder of this frame. Unknown messages are ignored.
    pub fn dispatch(&self, protocol: &mut P, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
        let code = frame.code();
        protocol.on_header(frame, ctx)?;
        match self.table.get(&code) {
            Some((name, handler)) => {
                ctx.descriptor = format!("{} {} ({}): len={}", P::NAME, name, P::label(code), frame.len());
                trace!("{}", ctx.descriptor);
                handler(protocol, frame, ctx)
            },
            None => {
                ctx.descriptor = format!("{} {}: len={}", P::NAME, P::label(code), frame.len());
                trace!("{} - ignored", ctx.descriptor);
                Ok(Status::None)
            },
        }
    }
}
