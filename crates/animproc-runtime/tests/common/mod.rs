#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use animproc_core::{ClockTime, FaultCode, ANIM_TIME_STEP_MS};
use animproc_runtime::{
    AnimProcess, AnimProcessConfig, Comms, FaultDisplay, MicSystem, Services, TickOutcome,
};
use animproc_stream::InMemoryLibrary;
use animproc_transport::{MemoryLink, MemoryPeer};
use animproc_wire::{EngineToRobot, MicData, RobotToEngine};

pub const ANIMATIONS: &str = r#"[
    {"name": "anim_nod", "head": [{"trigger_time_ms": 0, "duration_ms": 66, "angle_deg": 10},
                                  {"trigger_time_ms": 66, "duration_ms": 33, "angle_deg": -5}]},
    {"name": "anim_long", "head": [{"trigger_time_ms": 0, "duration_ms": 330, "angle_deg": 5},
                                   {"trigger_time_ms": 330, "duration_ms": 330, "angle_deg": 0}]},
    {"name": "anim_neutral_eyes_01", "face": [{"trigger_time_ms": 0}]}
]"#;

#[derive(Clone, Default)]
pub struct FaultLog(pub Arc<Mutex<Vec<FaultCode>>>);

impl FaultDisplay for FaultLog {
    fn display_fault(&mut self, fault: FaultCode) {
        self.0.lock().push(fault);
    }
}

impl FaultLog {
    pub fn count(&self, fault: FaultCode) -> usize {
        self.0.lock().iter().filter(|f| **f == fault).count()
    }
}

#[derive(Clone, Default)]
pub struct MicLog(pub Arc<Mutex<Vec<u32>>>);

impl MicSystem for MicLog {
    fn process_mic_data(&mut self, data: &MicData) {
        self.0.lock().push(data.sequence_id);
    }
}

pub struct Harness {
    pub process: AnimProcess,
    pub robot: MemoryPeer,
    pub engine: MemoryPeer,
    pub faults: FaultLog,
    pub mic: MicLog,
    pub now_ms: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(true)
    }

    pub fn with_engine(engine_connected: bool) -> Self {
        let (robot_link, robot) = MemoryLink::pair(true);
        let (engine_link, engine) = MemoryLink::pair(engine_connected);
        let faults = FaultLog::default();
        let mic = MicLog::default();
        let services = Services {
            faults: Box::new(faults.clone()),
            mic: Box::new(mic.clone()),
            ..Services::default()
        };

        let mut library = InMemoryLibrary::new();
        library.load_json(ANIMATIONS).unwrap();
        let process = AnimProcess::new(
            &AnimProcessConfig::default(),
            Comms::new(Box::new(robot_link), Box::new(engine_link)),
            Box::new(library),
            services,
        )
        .unwrap();

        Harness {
            process,
            robot,
            engine,
            faults,
            mic,
            now_ms: 0,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.process.update(ClockTime::from_millis(self.now_ms));
        self.now_ms += ANIM_TIME_STEP_MS as u64;
        outcome
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            assert_eq!(self.tick(), TickOutcome::Continue);
        }
    }

    /// Tick until the clock passes `ms`
    pub fn run_until(&mut self, ms: u64) {
        while self.now_ms <= ms {
            assert_eq!(self.tick(), TickOutcome::Continue);
        }
    }

    pub fn from_engine(&self, msg: EngineToRobot) {
        self.engine.push(msg.encode().unwrap());
    }

    pub fn from_robot(&self, msg: RobotToEngine) {
        self.robot.push(msg.encode().unwrap());
    }

    pub fn sent_to_engine(&self) -> Vec<RobotToEngine> {
        self.engine
            .take_sent()
            .iter()
            .map(|bytes| RobotToEngine::decode(bytes).unwrap())
            .collect()
    }

    pub fn sent_to_robot(&self) -> Vec<EngineToRobot> {
        self.robot
            .take_sent()
            .iter()
            .map(|bytes| EngineToRobot::decode(bytes).unwrap())
            .collect()
    }
}
