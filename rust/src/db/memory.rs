/// Scripted in-process database
///
/// Jobs are parked on submit and answered by the responder on the next
/// `poll_completed`, so callers still see the "submit now, resume on a
/// later frame" contract of the real backend.

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use super::{CompletedJob, Database, DbError, QueryJob, QueryResult, Value};

type Responder = dyn Fn(&str, &[Value]) -> Result<QueryResult, DbError> + Send + Sync;

pub struct MemoryDatabase {
    pending: SegQueue<QueryJob>,
    responder: Box<Responder>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MemoryDatabase {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<QueryResult, DbError> + Send + Sync + 'static,
    {
        Self {
            pending: SegQueue::new(),
            responder: Box::new(responder),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Every query answers with an empty result set
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(QueryResult::empty()))
    }

    /// Number of jobs waiting for the next poll
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// SQL and params of every job answered so far, in answer order
    pub fn answered(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().clone()
    }
}

impl Database for MemoryDatabase {
    fn execute_async(&self, job: QueryJob) -> Result<(), DbError> {
        self.pending.push(job);
        Ok(())
    }

    fn poll_completed(&self) -> Vec<CompletedJob> {
        // Only jobs queued before this poll complete; follow-ups wait a frame.
        let count = self.pending.len();
        let mut done = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(job) = self.pending.pop() else {
                break;
            };
            let result = (self.responder)(job.sql, &job.params);
            self.log.lock().push((job.sql.to_string(), job.params.clone()));
            done.push(CompletedJob { id: job.id, result });
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_complete_on_next_poll_only() {
        let db = MemoryDatabase::new(|sql, _| {
            Ok(QueryResult::new(vec![vec![Value::Text(sql.to_string())]]))
        });
        db.execute_async(QueryJob::new("SELECT 1", vec![])).unwrap();
        assert_eq!(db.pending(), 1);

        let done = db.poll_completed();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].result.as_ref().unwrap().row_count(), 1);
        assert!(db.poll_completed().is_empty());
        assert_eq!(db.answered().len(), 1);
    }
}
