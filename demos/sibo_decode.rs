//! Decode a SIBO bus capture file and print the annotations.
//!
//! ```sh
//! cargo run --example sibo_decode -- capture.zip --clk 0 --data 1 --sdir 2
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;

use clap::Parser;
use sibo::{
    Annotation, CaptureFileSource, InputPort, OutputPort, Pipeline, PortDirection, PortSchema,
    ProcessNode, SiboDecoder, WorkError, WorkResult,
};

#[derive(Parser)]
#[command(about = "Decode a SIBO bus capture file")]
struct Args {
    /// Capture file (zip with a header entry and packed line entries)
    capture: PathBuf,

    /// Capture line carrying the serial clock
    #[arg(long, default_value_t = 0)]
    clk: usize,

    /// Capture line carrying the serial data
    #[arg(long, default_value_t = 1)]
    data: usize,

    /// Capture line carrying the SDIR direction pin, if wired
    #[arg(long)]
    sdir: Option<usize>,

    /// Show individual clock pulses
    #[arg(long)]
    show_clk: bool,

    /// Show sampled bits
    #[arg(long)]
    show_bits: bool,

    /// Show raw dumps of complete frames
    #[arg(long)]
    show_raw: bool,

    /// Attribute data bytes to the peripheral from protocol context
    #[arg(long)]
    guess_asic: bool,
}

/// Sink node that prints every annotation to stdout.
struct AnnotationPrinter {
    buffer: VecDeque<Annotation>,
}

impl ProcessNode for AnnotationPrinter {
    fn name(&self) -> &str {
        "annotation_printer"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>(
            "annotations",
            0,
            PortDirection::Input,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input = inputs[0]
            .get::<Annotation>(&mut self.buffer)
            .ok_or_else(|| WorkError::NodeError("missing annotation input".to_string()))?;
        let annotation = input.recv()?;
        println!("{annotation}");
        Ok(1)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let source = CaptureFileSource::new(&args.capture)?;

    let mut decoder = SiboDecoder::new();
    if args.sdir.is_some() {
        decoder = decoder.with_sdir();
    }
    if args.show_clk {
        decoder = decoder.with_clock_pulses();
    }
    if args.show_bits {
        decoder = decoder.with_bits();
    }
    if args.show_raw {
        decoder = decoder.with_raw_frames();
    }
    if args.guess_asic {
        decoder = decoder.with_guessed_asic_data();
    }

    let mut pipeline = Pipeline::new();
    pipeline.add_process("source", source)?;
    pipeline.add_process("decoder", decoder)?;
    pipeline.add_process(
        "printer",
        AnnotationPrinter {
            buffer: VecDeque::new(),
        },
    )?;

    pipeline.connect("source", &format!("line{}", args.clk), "decoder", "clk")?;
    pipeline.connect("source", &format!("line{}", args.data), "decoder", "data")?;
    if let Some(sdir) = args.sdir {
        pipeline.connect("source", &format!("line{sdir}"), "decoder", "sdir")?;
    }
    pipeline.connect("decoder", "annotations", "printer", "annotations")?;

    let scheduler = pipeline.build()?;
    scheduler.wait();

    Ok(())
}
