use flash_core::{TimerId, TimerRegs, TIMER_CASCADE, TIMER_START};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Running,
    Stopped,
}

/// 32-bit cycle window built from a low counter and a cascaded overflow
/// counter. While armed or running, interrupts are masked.
pub struct CycleTimer<T: TimerRegs> {
    regs: T,
    state: TimerState,
}

impl<T: TimerRegs> CycleTimer<T> {
    pub fn new(regs: T) -> Self {
        Self { regs, state: TimerState::Idle }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn regs(&self) -> &T {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut T {
        &mut self.regs
    }

    pub fn into_regs(self) -> T {
        self.regs
    }

    pub fn setup(&mut self) {
        if matches!(self.state, TimerState::Armed | TimerState::Running) {
            log::warn!("timer setup while {:?}", self.state);
        }
        self.regs.write_control(TimerId::Low, 0);
        self.regs.write_reload(TimerId::Low, 0);
        self.regs.write_control(TimerId::High, 0);
        self.regs.write_reload(TimerId::High, 0);

        self.regs.write_control(TimerId::High, TIMER_CASCADE | TIMER_START);
        self.regs.set_interrupt_master(false);
        self.state = TimerState::Armed;
    }

    #[inline(always)]
    pub fn start(&mut self) {
        if self.state != TimerState::Armed {
            log::warn!("timer start while {:?}", self.state);
        }
        self.regs.write_control(TimerId::Low, TIMER_START);
        self.state = TimerState::Running;
    }

    #[inline(always)]
    pub fn end(&mut self) {
        if self.state != TimerState::Running {
            log::warn!("timer end while {:?}", self.state);
        }
        self.regs.write_control(TimerId::Low, 0);
        self.regs.set_interrupt_master(true);
        self.state = TimerState::Stopped;
    }

    pub fn result(&mut self) -> u32 {
        let high = self.regs.read_count(TimerId::High) as u32;
        let low = self.regs.read_count(TimerId::Low) as u32;
        (high << 16) | low
    }
}
