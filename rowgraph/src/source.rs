//!
//! Async collaborators.
//!
//! The engine never awaits while binding. An async collaborator only hands
//! over complete recordsets, which [`crate::query::Query::read_async`] then
//! reads synchronously.
//!

use async_trait::*;
use futures_util::stream::{Stream, StreamExt};

use crate::recordset::{Recordset, Recordsets};
use crate::RowGraphResult;

#[async_trait]
pub trait AsyncResultReader: Send {
    async fn next_recordset(&mut self) -> RowGraphResult<Option<Recordset>>;
}

#[async_trait]
impl AsyncResultReader for Recordsets {
    async fn next_recordset(&mut self) -> RowGraphResult<Option<Recordset>> {
        crate::recordset::ResultReader::next_recordset(self)
    }
}

/// Adapts a stream of recordsets.
pub struct StreamReader<S> {
    stream: S,
}

impl<S> StreamReader<S>
where
    S: Stream<Item = RowGraphResult<Recordset>> + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> AsyncResultReader for StreamReader<S>
where
    S: Stream<Item = RowGraphResult<Recordset>> + Unpin + Send,
{
    async fn next_recordset(&mut self) -> RowGraphResult<Option<Recordset>> {
        self.stream.next().await.transpose()
    }
}
