use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::bytecode::Program;
use crate::bytecode::decode::{Instruction, Parameter, decode};
use crate::bytecode::op::Opcode;
use crate::runtime::io::{ConsoleInput, ConsoleOutput, InputHook, InputPort, OutputPort};
use crate::runtime::memory::Memory;
use crate::runtime::runtime_error::{ErrorKind, RuntimeError};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Instruction budget per run. `None` runs until Halt.
    pub max_steps: Option<u64>,
    /// Number of addressable memory cells.
    pub max_memory: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: None,
            max_memory: 1 << 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Halted,
}

pub struct Vm<I = ConsoleInput, O = ConsoleOutput> {
    program: Program,
    memory: Memory,
    pc: usize,
    relative_base: i64,
    state: State,
    steps: u64,
    input: I,
    output: O,
    hook: Option<Box<dyn InputHook>>,
    config: VmConfig,
}

impl Vm {
    /// A VM that talks to the console.
    pub fn new(program: Program) -> Self {
        Vm::with_io(program, ConsoleInput::new(), ConsoleOutput::new())
    }
}

impl<I: InputPort, O: OutputPort> Vm<I, O> {
    pub fn with_io(program: Program, input: I, output: O) -> Self {
        let config = VmConfig::default();
        Self {
            memory: Memory::from_program(&program, config.max_memory),
            program,
            pc: 0,
            relative_base: 0,
            state: State::Running,
            steps: 0,
            input,
            output,
            hook: None,
            config,
        }
    }

    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self.reset_execution_state();
        self
    }

    pub fn with_input<I2: InputPort>(self, input: I2) -> Vm<I2, O> {
        Vm {
            program: self.program,
            memory: self.memory,
            pc: self.pc,
            relative_base: self.relative_base,
            state: self.state,
            steps: self.steps,
            input,
            output: self.output,
            hook: self.hook,
            config: self.config,
        }
    }

    pub fn with_output<O2: OutputPort>(self, output: O2) -> Vm<I, O2> {
        Vm {
            program: self.program,
            memory: self.memory,
            pc: self.pc,
            relative_base: self.relative_base,
            state: self.state,
            steps: self.steps,
            input: self.input,
            output,
            hook: self.hook,
            config: self.config,
        }
    }

    pub fn with_input_hook(mut self, hook: impl InputHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn relative_base(&self) -> i64 {
        self.relative_base
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Fresh memory from the program image, pc and relative base at zero.
    pub fn reset_execution_state(&mut self) {
        self.memory = Memory::from_program(&self.program, self.config.max_memory);
        self.pc = 0;
        self.relative_base = 0;
        self.state = State::Running;
        self.steps = 0;
    }

    /// Runs the program from the start until it halts and returns the final
    /// memory. Each call starts over from the program image.
    ///
    /// Both ports are closed when the run ends, on a fault as well as on
    /// Halt, so neighbours blocked on them stop waiting.
    pub async fn run(&mut self) -> Result<Vec<i64>, RuntimeError> {
        self.reset_execution_state();
        debug!(cells = self.program.len(), "vm started");

        while self.state == State::Running {
            // Loops without I/O never suspend on a port. Each instruction
            // spends coop budget so the task still yields.
            tokio::task::consume_budget().await;

            if let Err(e) = self.step().await {
                debug!(error = %e, "vm faulted");
                self.close_ports();
                return Err(e);
            }
        }

        debug!(steps = self.steps, "vm halted");
        Ok(self.memory.as_slice().to_vec())
    }

    /// Moves the VM onto its own task. The task yields the VM back once it
    /// halts so its memory can still be inspected.
    pub fn spawn(mut self) -> JoinHandle<Result<Self, RuntimeError>>
    where
        I: 'static,
        O: 'static,
    {
        tokio::spawn(async move {
            self.run().await?;
            Ok(self)
        })
    }

    /// Executes a single instruction.
    pub async fn step(&mut self) -> Result<State, RuntimeError> {
        if self.state == State::Halted {
            return Ok(State::Halted);
        }

        let pc = self.pc;
        let at = |kind: ErrorKind| RuntimeError::new(kind).with_pc(pc);

        self.check_limits().map_err(at)?;
        let instr = decode(&mut self.memory, pc).map_err(at)?;
        trace!(pc, rb = self.relative_base, "{}", instr);

        self.execute(instr).await.map_err(at)?;
        Ok(self.state)
    }

    fn close_ports(&mut self) {
        self.input.close();
        self.output.close();
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), ErrorKind> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(ErrorKind::StepLimitExceeded(max));
            }
        }

        Ok(())
    }

    fn load(&mut self, param: Parameter) -> Result<i64, ErrorKind> {
        self.memory.read(param, self.relative_base)
    }

    fn store(&mut self, param: Parameter, value: i64) -> Result<(), ErrorKind> {
        self.memory.write(param, self.relative_base, value)
    }

    fn jump_target(value: i64) -> Result<usize, ErrorKind> {
        usize::try_from(value).map_err(|_| ErrorKind::AddressOutOfRange(value as i128))
    }

    async fn execute(&mut self, instr: Instruction) -> Result<(), ErrorKind> {
        let next = self.pc + instr.width();

        match instr.opcode {
            // Arithmetic
            Opcode::Add => {
                let a = self.load(instr.param(0))?;
                let b = self.load(instr.param(1))?;
                let sum = a.checked_add(b).ok_or(ErrorKind::ArithmeticOverflow)?;
                self.store(instr.param(2), sum)?;
            }
            Opcode::Multiply => {
                let a = self.load(instr.param(0))?;
                let b = self.load(instr.param(1))?;
                let product = a.checked_mul(b).ok_or(ErrorKind::ArithmeticOverflow)?;
                self.store(instr.param(2), product)?;
            }

            // I/O
            Opcode::Input => {
                if let Some(hook) = self.hook.as_mut() {
                    hook.before_input().await?;
                }
                let value = self.input.read().await?;
                debug!(value, "input");
                self.store(instr.param(0), value)?;
            }
            Opcode::Output => {
                let value = self.load(instr.param(0))?;
                debug!(value, "output");
                self.output.write(value).await?;
            }

            // Control flow
            Opcode::JumpIfTrue => {
                if self.load(instr.param(0))? != 0 {
                    self.pc = Self::jump_target(self.load(instr.param(1))?)?;
                    return Ok(());
                }
            }
            Opcode::JumpIfFalse => {
                if self.load(instr.param(0))? == 0 {
                    self.pc = Self::jump_target(self.load(instr.param(1))?)?;
                    return Ok(());
                }
            }

            // Comparison
            Opcode::LessThan => {
                let a = self.load(instr.param(0))?;
                let b = self.load(instr.param(1))?;
                self.store(instr.param(2), (a < b) as i64)?;
            }
            Opcode::Equals => {
                let a = self.load(instr.param(0))?;
                let b = self.load(instr.param(1))?;
                self.store(instr.param(2), (a == b) as i64)?;
            }

            Opcode::AdjustRelativeBase => {
                let offset = self.load(instr.param(0))?;
                self.relative_base = self
                    .relative_base
                    .checked_add(offset)
                    .ok_or(ErrorKind::ArithmeticOverflow)?;
            }

            Opcode::Halt => {
                self.state = State::Halted;
                self.close_ports();
                return Ok(());
            }
        }

        self.pc = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Program;
    use crate::runtime::io::{CollectedOutput, ScriptedInput};
    use crate::runtime::runtime_error::PortError;

    fn vm(cells: &[i64]) -> Vm<ScriptedInput, CollectedOutput> {
        Vm::with_io(Program::from(cells), ScriptedInput::default(), CollectedOutput::new())
    }

    fn vm_with_input(cells: &[i64], input: &[i64]) -> Vm<ScriptedInput, CollectedOutput> {
        Vm::with_io(
            Program::from(cells),
            ScriptedInput::new(input.iter().copied()),
            CollectedOutput::new(),
        )
    }

    async fn run_outputs(cells: &[i64], input: &[i64]) -> Vec<i64> {
        let mut vm = vm_with_input(cells, input);
        vm.run().await.unwrap();
        vm.output().values().to_vec()
    }

    // =========================================================================
    // Single instructions
    // =========================================================================

    #[tokio::test]
    async fn test_add() {
        let mut vm = vm(&[1, 5, 6, 7, 99, 20, 22, 0]);
        assert_eq!(vm.step().await.unwrap(), State::Running);
        assert_eq!(vm.pc(), 4);
        assert_eq!(vm.memory().as_slice()[7], 42);
    }

    #[tokio::test]
    async fn test_multiply() {
        let mut vm = vm(&[2, 5, 6, 7, 99, 6, 7, 0]);
        vm.step().await.unwrap();
        assert_eq!(vm.pc(), 4);
        assert_eq!(vm.memory().as_slice()[7], 42);
    }

    #[tokio::test]
    async fn test_input() {
        let mut vm = vm_with_input(&[3, 3, 99, 0], &[-8]);
        vm.step().await.unwrap();
        assert_eq!(vm.pc(), 2);
        assert_eq!(vm.memory().as_slice()[3], -8);
    }

    #[tokio::test]
    async fn test_output() {
        let mut vm = vm(&[4, 3, 99, 17]);
        vm.step().await.unwrap();
        assert_eq!(vm.pc(), 2);
        assert_eq!(vm.output().values(), &[17]);
    }

    #[tokio::test]
    async fn test_jump_if_true() {
        let mut taken = vm(&[1105, 1, 9]);
        taken.step().await.unwrap();
        assert_eq!(taken.pc(), 9);

        let mut not_taken = vm(&[1105, 0, 9]);
        not_taken.step().await.unwrap();
        assert_eq!(not_taken.pc(), 3);
    }

    #[tokio::test]
    async fn test_jump_if_false() {
        let mut taken = vm(&[1106, 0, 9]);
        taken.step().await.unwrap();
        assert_eq!(taken.pc(), 9);

        let mut not_taken = vm(&[1106, 5, 9]);
        not_taken.step().await.unwrap();
        assert_eq!(not_taken.pc(), 3);
    }

    #[tokio::test]
    async fn test_less_than() {
        let mut less = vm(&[1107, 3, 4, 5, 99, 9]);
        less.step().await.unwrap();
        assert_eq!(less.pc(), 4);
        assert_eq!(less.memory().as_slice()[5], 1);

        let mut not_less = vm(&[1107, 4, 4, 5, 99, 9]);
        not_less.step().await.unwrap();
        assert_eq!(not_less.memory().as_slice()[5], 0);
    }

    #[tokio::test]
    async fn test_equals() {
        let mut equal = vm(&[1108, 4, 4, 5, 99, 9]);
        equal.step().await.unwrap();
        assert_eq!(equal.pc(), 4);
        assert_eq!(equal.memory().as_slice()[5], 1);

        let mut not_equal = vm(&[1108, 4, -4, 5, 99, 9]);
        not_equal.step().await.unwrap();
        assert_eq!(not_equal.memory().as_slice()[5], 0);
    }

    #[tokio::test]
    async fn test_adjust_relative_base() {
        let mut vm = vm(&[109, 19, 209, -7, 99]);
        vm.step().await.unwrap();
        assert_eq!(vm.pc(), 2);
        assert_eq!(vm.relative_base(), 19);

        // memory[19 - 7] reads zero from grown memory
        vm.step().await.unwrap();
        assert_eq!(vm.relative_base(), 19);
    }

    #[tokio::test]
    async fn test_halt() {
        let mut vm = vm(&[99, 1, 2]);
        assert_eq!(vm.step().await.unwrap(), State::Halted);
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.step().await.unwrap(), State::Halted);
    }

    // =========================================================================
    // Addressing modes
    // =========================================================================

    #[tokio::test]
    async fn test_add_modes() {
        // position: mem[5] + mem[6]
        let mut position = vm(&[1, 5, 6, 7, 99, 10, 20, 0]);
        position.run().await.unwrap();
        assert_eq!(position.memory().as_slice()[7], 30);

        // immediate: 5 + 6
        let mut immediate = vm(&[1101, 5, 6, 7, 99, 10, 20, 0]);
        immediate.run().await.unwrap();
        assert_eq!(immediate.memory().as_slice()[7], 11);

        // relative with rb = 4: mem[4+1] + mem[4+2], stored at mem[4+3]
        let mut relative = vm(&[109, 4, 22201, 3, 4, 5, 99, 10, 20, 0]);
        relative.run().await.unwrap();
        assert_eq!(relative.memory().as_slice()[9], 30);
    }

    #[tokio::test]
    async fn test_relative_base_accumulates() {
        let out = run_outputs(&[109, 2000, 109, 19, 204, -34, 99], &[]).await;
        // reads memory[1985], which grew in as zero
        assert_eq!(out, vec![0]);
    }

    // =========================================================================
    // Programs
    // =========================================================================

    #[tokio::test]
    async fn test_add_multiply_program() {
        let mut vm = vm(&[1, 9, 10, 3, 2, 3, 11, 0, 99, 30, 40, 50]);
        let memory = vm.run().await.unwrap();
        assert_eq!(memory, vec![3500, 9, 10, 70, 2, 3, 11, 0, 99, 30, 40, 50]);
    }

    #[tokio::test]
    async fn test_negative_operands() {
        let memory = vm(&[1101, 100, -1, 4, 0]).run().await.unwrap();
        assert_eq!(memory, vec![1101, 100, -1, 4, 99]);
    }

    #[tokio::test]
    async fn test_compare_with_eight() {
        let program = [
            3, 21, 1008, 21, 8, 20, 1005, 20, 22, 107, 8, 21, 20, 1006, 20, 31, 1106, 0, 36, 98,
            0, 0, 1002, 21, 125, 20, 4, 20, 1105, 1, 46, 104, 999, 1105, 1, 46, 1101, 1000, 1, 20,
            4, 20, 1105, 1, 46, 98, 99,
        ];
        assert_eq!(run_outputs(&program, &[7]).await, vec![999]);
        assert_eq!(run_outputs(&program, &[8]).await, vec![1000]);
        assert_eq!(run_outputs(&program, &[9]).await, vec![1001]);
    }

    #[tokio::test]
    async fn test_jump_program() {
        let program = [3, 12, 6, 12, 15, 1, 13, 14, 13, 4, 13, 99, -1, 0, 1, 9];
        assert_eq!(run_outputs(&program, &[0]).await, vec![0]);
        assert_eq!(run_outputs(&program, &[5]).await, vec![1]);
    }

    #[tokio::test]
    async fn test_write_beyond_program_zero_fills() {
        let mut vm = vm(&[1101, 2, 3, 10, 99]);
        let memory = vm.run().await.unwrap();
        assert_eq!(memory, vec![1101, 2, 3, 10, 99, 0, 0, 0, 0, 0, 5]);
    }

    #[tokio::test]
    async fn test_run_twice_is_identical() {
        let mut vm = vm(&[1, 9, 10, 3, 2, 3, 11, 0, 99, 30, 40, 50]);
        let first = vm.run().await.unwrap();
        let second = vm.run().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], 3500);
    }

    // =========================================================================
    // Faults
    // =========================================================================

    #[tokio::test]
    async fn test_immediate_write_rejected() {
        let mut vm = vm(&[11101, 1, 1, 3, 99]);
        let err = vm.run().await.unwrap_err();

        assert!(matches!(err.kind, ErrorKind::InvalidWrite));
        assert_eq!(err.pc, Some(0));
        assert_eq!(vm.memory().as_slice(), &[11101, 1, 1, 3, 99]);
    }

    #[tokio::test]
    async fn test_unknown_opcode_reports_pc() {
        let mut vm = vm(&[1101, 1, 1, 5, 42, 0]);
        let err = vm.run().await.unwrap_err();

        assert!(matches!(err.kind, ErrorKind::UnknownOpcode(42)));
        assert_eq!(err.pc, Some(4));
        assert_eq!(err.to_string(), "runtime error: unknown opcode 42 at pc 4");
    }

    #[tokio::test]
    async fn test_unknown_mode() {
        let err = vm(&[301, 0, 0, 0, 99]).run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownAddressingMode(3)));
    }

    #[tokio::test]
    async fn test_negative_address() {
        let err = vm(&[1, -1, 0, 0, 99]).run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AddressOutOfRange(-1)));
    }

    #[tokio::test]
    async fn test_negative_jump_target() {
        let err = vm(&[1105, 1, -3]).run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AddressOutOfRange(-3)));
    }

    #[tokio::test]
    async fn test_overflow_is_reported() {
        let err = vm(&[1102, i64::MAX, 2, 0, 99]).run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArithmeticOverflow));
    }

    #[tokio::test]
    async fn test_input_exhausted() {
        let err = vm(&[3, 0, 99]).run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Port(PortError::Closed)));
        assert_eq!(err.pc, Some(0));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let config = VmConfig {
            max_steps: Some(10),
            ..VmConfig::default()
        };
        let mut vm = vm(&[1105, 1, 0]).with_config(config);
        let err = vm.run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::StepLimitExceeded(10)));
    }

    #[tokio::test]
    async fn test_memory_limit() {
        let config = VmConfig {
            max_memory: 16,
            ..VmConfig::default()
        };
        let err = vm(&[1101, 1, 1, 16, 99]).with_config(config).run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AddressOutOfRange(16)));
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    #[tokio::test]
    async fn test_hook_runs_before_each_input() {
        let (mut vm, calls) = {
            let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let seen = calls.clone();
            let vm = vm_with_input(&[3, 0, 3, 0, 4, 0, 99], &[1, 2]).with_input_hook(move || -> Result<(), PortError> {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            });
            (vm, calls)
        };

        vm.run().await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(vm.output().values(), &[2]);
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_run() {
        let mut vm = vm_with_input(&[3, 0, 99], &[1])
            .with_input_hook(|| -> Result<(), PortError> {
                Err(PortError::Hook("no controller".into()))
            });
        let err = vm.run().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Port(PortError::Hook(_))));
    }

    #[tokio::test]
    async fn test_ports_can_be_swapped() {
        let mut vm = vm(&[3, 0, 4, 0, 99])
            .with_input(ScriptedInput::new([6]))
            .with_output(CollectedOutput::new());
        vm.run().await.unwrap();
        assert_eq!(vm.output().values(), &[6]);
    }

    #[tokio::test]
    async fn test_busy_loop_times_out() {
        let mut spinning = vm(&[1105, 1, 0]);
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(100), spinning.run()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_busy_loop_can_be_aborted() {
        let task = vm(&[1105, 1, 0]).spawn();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        task.abort();
        let err = task.await.err().unwrap();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_spawn_returns_vm() {
        let handle = vm(&[1101, 20, 22, 0, 99]).spawn();
        let vm = handle.await.unwrap().unwrap();
        assert_eq!(vm.state(), State::Halted);
        assert_eq!(vm.memory().as_slice()[0], 42);
    }
}
