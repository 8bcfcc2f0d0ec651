//! Single writer for the local database.
//!
//! Every mutation runs on one dedicated thread inside an immediate SQLite
//! transaction, so a domain row and its outbox entry commit together and
//! pulled rows never interleave with local edits.

use diesel::{Connection, SqliteConnection};
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use ledgerline_core::errors::{Error, Result};

use super::DbPool;
use crate::errors::StorageError;

const WRITE_QUEUE_DEPTH: usize = 256;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Handle to the writer thread. Cheap to clone; the thread exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::Sender<Job>,
}

/// Error carried out of a transaction closure: either the job's own error or
/// a failure of the transaction itself.
enum WriteJobError {
    Job(Error),
    Transaction(diesel::result::Error),
}

impl From<diesel::result::Error> for WriteJobError {
    fn from(err: diesel::result::Error) -> Self {
        WriteJobError::Transaction(err)
    }
}

impl From<WriteJobError> for Error {
    fn from(err: WriteJobError) -> Self {
        match err {
            WriteJobError::Job(err) => err,
            WriteJobError::Transaction(err) => StorageError::from(err).into(),
        }
    }
}

impl WriteHandle {
    /// Runs `job` in a transaction on the writer thread. An `Err` from the job
    /// rolls back everything it wrote.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let wrapped: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, WriteJobError, _>(|tx_conn| {
                    job(tx_conn).map_err(WriteJobError::Job)
                })
                .map_err(Error::from);
            if reply_tx.send(result).is_err() {
                debug!("Write job finished after its caller went away");
            }
        });

        self.sender
            .send(wrapped)
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer thread has stopped".to_string()))?;
        reply_rx.await.map_err(|_| {
            Error::from(StorageError::WriterUnavailable(
                "write job was dropped before completing".to_string(),
            ))
        })?
    }
}

/// Starts the writer thread over `pool`.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, mut receiver) = mpsc::channel::<Job>(WRITE_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name("ledgerline-writer".to_string())
        .spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut *conn),
                    // Dropping the job closes its reply channel; the caller sees WriterUnavailable.
                    Err(err) => error!("Writer could not get a connection: {}", err),
                }
            }
            debug!("Writer thread stopped");
        })
        .map(|_| ())
        .unwrap_or_else(|err| error!("Failed to start writer thread: {}", err));
    WriteHandle { sender }
}
