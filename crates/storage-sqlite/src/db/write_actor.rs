//! Single-writer actor.
//!
//! SQLite allows one writer at a time; instead of letting pool connections
//! race for the write lock, every write is shipped to one dedicated thread
//! and executed inside an immediate transaction. Callers await the result
//! through a oneshot reply.

use std::any::Any;
use std::thread;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use log::error;
use tokio::sync::{mpsc, oneshot};

use thriftly_core::errors::{DatabaseError, Error, Result};

const WRITE_QUEUE_DEPTH: usize = 64;

type JobOutput = Box<dyn Any + Send>;
type JobResult = Result<JobOutput>;
type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) -> JobResult + Send>;

/// Distinguishes job errors from transaction machinery errors so a job
/// failure rolls the transaction back without losing the original error.
enum TxError {
    App(Error),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Db(err)
    }
}

fn internal(message: &str) -> Error {
    Error::Database(DatabaseError::Internal(message.to_string()))
}

/// Cloneable handle for submitting write jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<(WriteJob, oneshot::Sender<JobResult>)>,
}

impl WriteHandle {
    /// Run `job` inside a write transaction on the writer thread. The job's
    /// error rolls the whole transaction back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: WriteJob =
            Box::new(move |conn| job(conn).map(|value| Box::new(value) as JobOutput));

        self.tx
            .send((boxed, reply_tx))
            .await
            .map_err(|_| internal("Writer thread is gone"))?;
        let output = reply_rx
            .await
            .map_err(|_| internal("Writer thread dropped the reply"))??;

        output
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| internal("Write job returned an unexpected type"))
    }
}

/// Spawn the writer thread. It owns one pool handle and drains jobs until
/// every `WriteHandle` clone is dropped.
pub fn spawn_writer(pool: Pool<ConnectionManager<SqliteConnection>>) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(WriteJob, oneshot::Sender<JobResult>)>(WRITE_QUEUE_DEPTH);

    thread::spawn(move || {
        while let Some((job, reply)) = rx.blocking_recv() {
            let result = match pool.get() {
                Ok(mut conn) => run_in_transaction(&mut conn, job),
                Err(e) => {
                    error!("Writer could not obtain a connection: {}", e);
                    Err(Error::Database(DatabaseError::ConnectionFailed(
                        e.to_string(),
                    )))
                }
            };
            // Caller may have given up waiting; nothing to do then.
            let _ = reply.send(result);
        }
    });

    WriteHandle { tx }
}

fn run_in_transaction(conn: &mut SqliteConnection, job: WriteJob) -> JobResult {
    let mut output: Option<JobOutput> = None;
    let tx_result = conn.immediate_transaction::<_, TxError, _>(|tx_conn| {
        output = Some(job(tx_conn).map_err(TxError::App)?);
        Ok(())
    });

    match tx_result {
        Ok(()) => output.ok_or_else(|| internal("Write job produced no output")),
        Err(TxError::App(err)) => Err(err),
        Err(TxError::Db(err)) => Err(Error::Database(DatabaseError::QueryFailed(err.to_string()))),
    }
}
