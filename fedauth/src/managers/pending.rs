use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::Error;

/// An in-flight operation that any number of callers may join
pub(crate) type Pending<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

/// Which in-flight operation a caller should join
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PendingKey {
    /// A refresh of the portal credentials
    Portal,
    /// Federation with the server at the given root
    Server(String),
}

pub(crate) fn share<T, F>(fut: F) -> Pending<T>
where
    F: Future<Output = Result<T, Error>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fut.boxed().shared()
}
