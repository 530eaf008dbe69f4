use tiled_copy::config::HarnessConfig;
use tiled_copy::harness;

fn main() {
    let config = match HarnessConfig::get() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(-1);
        }
    };

    #[cfg(feature = "cuda")]
    let outcome = harness::run::<cubecl::cuda::CudaRuntime>(&Default::default(), &config);
    #[cfg(all(feature = "wgpu", not(feature = "cuda")))]
    let outcome = harness::run::<cubecl::wgpu::WgpuRuntime>(&Default::default(), &config);
    #[cfg(not(any(feature = "cuda", feature = "wgpu")))]
    let outcome = harness::run_host(&config);

    match outcome {
        Ok(outcome) => {
            if let Err(err) = outcome.report(&mut std::io::stdout(), &mut std::io::stderr()) {
                eprintln!("{err}");
                std::process::exit(-1);
            }
            std::process::exit(outcome.exit_code());
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(-1);
        }
    }
}
