//! Mock aggregator that answers receiver requests.
//!
//! ```text
//! cargo run --example aggregator -- --port 60201 --run 42
//! cargo run -- --in "REQ>tcp://127.0.0.1:60201" --sleep 2 --data-path out
//! ```

use clap::Parser;
use overwatch_receiver::codec::{SchemaCodec, SchemaEntry};
use overwatch_receiver::protocol::{DataType, Frame, Message, MessageBuffer};
use overwatch_receiver::record::Record;
use overwatch_receiver::ReceiverError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CLASS: &str = "TH1F";
const CLASS_VERSION: u16 = 1;

#[derive(Parser, Clone, Debug)]
#[command(name = "aggregator", about = "Mock aggregator for overwatch-receiver")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 60201)]
    port: u16,

    /// Run identifier reported in metadata
    #[arg(long, default_value_t = 42)]
    run: u32,

    /// Mode tag reported in metadata
    #[arg(long, default_value = "B")]
    mode: String,

    /// Records per reply
    #[arg(long, default_value_t = 3)]
    records: usize,
}

#[tokio::main]
async fn main() -> Result<(), ReceiverError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, "aggregator listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::info!(%peer, "receiver connected");
        let args = args.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(socket, &args).await {
                tracing::warn!(%peer, error = %e, "connection ended");
            }
        });
    }
}

async fn serve(mut socket: TcpStream, args: &Args) -> Result<(), ReceiverError> {
    let mut buffer = MessageBuffer::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut cycle = 0u32;

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        for request in buffer.push(&buf[..n])? {
            let Some(command) = request.frames().first() else {
                continue;
            };
            if command.data_type != DataType::CONFIG {
                tracing::warn!(data_type = ?command.data_type, "unexpected request");
                continue;
            }

            let options = String::from_utf8_lossy(command.payload()).into_owned();
            tracing::info!(options = %options, "request");

            let reply = build_reply(args, cycle, options.contains("-SchemaOnRequest"))?;
            socket.write_all(&reply.encode()).await?;
            cycle += 1;
        }
    }
}

fn build_reply(args: &Args, cycle: u32, with_schema: bool) -> Result<Message, ReceiverError> {
    let mut reply = Message::new().with_frame(Frame::new(
        DataType::INFO,
        format!("run={} HLT_MODE={}", args.run, args.mode).into_bytes(),
    ));

    if with_schema {
        let schema = SchemaCodec::encode_schema(&[SchemaEntry::new(CLASS, CLASS_VERSION)])?;
        reply.push(Frame::new(DataType::SCHEMA, schema));
    }

    for i in 0..args.records {
        let data: Vec<u8> = (0..64u32).flat_map(|bin| (bin * cycle).to_be_bytes()).collect();
        let record = Record::new(format!("hist{i}"), CLASS, CLASS_VERSION, data);
        reply.push(Frame::new(DataType::RECORD, SchemaCodec::encode_record(&record)?));
    }

    Ok(reply)
}
