#![allow(dead_code)]

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use lattice_di::{ApplicationBuilder, ApplicationContext, InitError, ModuleDef};

/// Returns `Pending` once, lets other futures of a `join!` make progress
pub struct YieldNow(bool);

pub fn yield_now() -> YieldNow {
    YieldNow(false)
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bootstraps `M`, returning errors instead of aborting
pub fn bootstrap<M: ModuleDef>() -> Result<ApplicationContext, InitError> {
    init_tracing();
    futures::executor::block_on(ApplicationBuilder::new::<M>().abort_on_error(false).build())
}
