#![allow(dead_code)]

//! Scripted board double: every handle obeys a shared script of faults and
//! reported values, and every call lands in a shared call log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use board_aging::{
    BoardBackend, BoardData, BoardError, BoardId, BoardResult, BoardShim, ExitCode, InputParams,
};

pub const SAMPLES_PER_READ: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Prepare,
    Release,
    StartStream,
    StopStream,
    GetBoardData,
    GetNumRows,
    GetSamplingRate,
    GetEegChannels,
}

/// What a scripted call does instead of succeeding.
#[derive(Debug, Clone)]
pub enum Fault {
    Device(ExitCode),
    Backend(&'static str),
    Panic(&'static str),
}

#[derive(Debug, Clone)]
pub struct Script {
    pub sampling_rate: u32,
    pub num_rows: usize,
    pub eeg_channels: Vec<usize>,
    pub faults: HashMap<Op, Fault>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            sampling_rate: 250,
            num_rows: 8,
            eeg_channels: vec![1, 2],
            faults: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub handle: usize,
    pub op: Op,
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<Call>>>,
    next_handle: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            ..Self::default()
        }
    }

    pub fn with_fault(op: Op, fault: Fault) -> Self {
        let mut script = Script::default();
        script.faults.insert(op, fault);
        Self::new(script)
    }

    pub fn with_sampling_rate(rate: u32) -> Self {
        Self::new(Script {
            sampling_rate: rate,
            ..Script::default()
        })
    }

    pub fn set_fault(&self, op: Op, fault: Option<Fault>) {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match fault {
            Some(fault) => script.faults.insert(op, fault),
            None => script.faults.remove(&op),
        };
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ops issued on one handle, in order.
    pub fn ops_for(&self, handle: usize) -> Vec<Op> {
        self.calls()
            .into_iter()
            .filter(|c| c.handle == handle)
            .map(|c| c.op)
            .collect()
    }

    pub fn handles_created(&self) -> usize {
        self.next_handle.load(Ordering::SeqCst)
    }

    /// Sessions prepared and not yet released, across all handles.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }
}

impl BoardBackend for ScriptedBackend {
    fn create(&self, board_id: BoardId, _params: &InputParams) -> BoardResult<Box<dyn BoardShim>> {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let board = ScriptedBoard {
            handle,
            board_id,
            backend: self.clone(),
            prepared: false,
            streaming: false,
            stopped: false,
        };
        board.hit(Op::Create)?;
        Ok(Box::new(board))
    }
}

pub struct ScriptedBoard {
    handle: usize,
    board_id: BoardId,
    backend: ScriptedBackend,
    prepared: bool,
    streaming: bool,
    stopped: bool,
}

impl ScriptedBoard {
    fn script(&self) -> Script {
        self.backend
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Log the call, then apply its scripted fault if any.
    fn hit(&self, op: Op) -> BoardResult<()> {
        self.backend
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call {
                handle: self.handle,
                op,
            });
        match self.script().faults.get(&op) {
            None => Ok(()),
            Some(Fault::Device(code)) => Err(BoardError::device(*code, format!("scripted {op:?}"))),
            Some(Fault::Backend(reason)) => Err(BoardError::Backend {
                reason: (*reason).to_string(),
            }),
            Some(Fault::Panic(message)) => panic!("{message}"),
        }
    }

    fn require_prepared(&self) -> BoardResult<()> {
        if self.prepared {
            Ok(())
        } else {
            Err(BoardError::device(ExitCode::BoardNotCreated, "board not prepared"))
        }
    }
}

impl BoardShim for ScriptedBoard {
    fn board_id(&self) -> BoardId {
        self.board_id
    }

    fn prepare_session(&mut self) -> BoardResult<()> {
        self.hit(Op::Prepare)?;
        if !self.prepared {
            self.prepared = true;
            self.backend.open.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn release_session(&mut self) -> BoardResult<()> {
        self.hit(Op::Release)?;
        if self.prepared {
            self.prepared = false;
            self.streaming = false;
            self.backend.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn start_stream(&mut self) -> BoardResult<()> {
        self.hit(Op::StartStream)?;
        self.require_prepared()?;
        self.streaming = true;
        self.stopped = false;
        Ok(())
    }

    fn stop_stream(&mut self) -> BoardResult<()> {
        self.hit(Op::StopStream)?;
        if !self.streaming {
            return Err(BoardError::device(
                ExitCode::StreamThreadIsNotRunning,
                "no stream running",
            ));
        }
        self.streaming = false;
        self.stopped = true;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn get_board_data(&mut self) -> BoardResult<BoardData> {
        self.hit(Op::GetBoardData)?;
        self.require_prepared()?;
        let rows = self.script().num_rows;
        if self.streaming {
            Ok(BoardData::new(vec![vec![0.0; SAMPLES_PER_READ]; rows]))
        } else if self.stopped {
            Ok(BoardData::empty(rows))
        } else {
            Err(BoardError::device(
                ExitCode::InvalidArguments,
                "no stream started",
            ))
        }
    }

    fn get_num_rows(&self) -> BoardResult<usize> {
        self.hit(Op::GetNumRows)?;
        Ok(self.script().num_rows)
    }

    fn get_sampling_rate(&self) -> BoardResult<u32> {
        self.hit(Op::GetSamplingRate)?;
        Ok(self.script().sampling_rate)
    }

    fn get_eeg_channels(&self) -> BoardResult<Vec<usize>> {
        self.hit(Op::GetEegChannels)?;
        Ok(self.script().eeg_channels)
    }
}
