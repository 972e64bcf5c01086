use anyhow::Result;
use rayos_vkcore::{AshLoader, ContextConfig, ExecutionContextBuilder};

const CYCLES: usize = 8;

fn required() -> bool {
    std::env::var_os("VKCORE_REQUIRED").is_some_and(|v| v != "0")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("vkcore smoke: start");

    let config = ContextConfig::from_env()?;

    let loader = match AshLoader::load() {
        Ok(loader) => loader,
        Err(e) => {
            if required() {
                anyhow::bail!("Vulkan required but unavailable: {e}");
            }
            log::warn!("vkcore smoke: loader=UNAVAILABLE ({e}); skipping");
            return Ok(());
        }
    };

    let context = match ExecutionContextBuilder::from_config(config).build(&loader) {
        Ok(context) => context,
        Err(e) => {
            if required() {
                anyhow::bail!("Vulkan required but context creation failed: {e}");
            }
            log::warn!("vkcore smoke: context=UNSUPPORTED ({e}); skipping");
            return Ok(());
        }
    };

    log::info!(
        "vkcore smoke: device='{}' queue_family={} entry_points={}",
        context.device_name(),
        context.queue_family_index(),
        context.dispatch().len()
    );

    let pool = context.create_work_pool()?;
    let mut unit = context.create_unit_of_work(&pool)?;
    for cycle in 0..CYCLES {
        unit.begin_if_not_in_recording()?;
        unit.end()?;
        unit.submit_and_reset(context.fence_timeout_ms())?;
        log::debug!("vkcore smoke: cycle {cycle} ok");
    }
    log::info!("vkcore smoke: {CYCLES} empty submissions=OK");

    drop(unit);
    drop(pool);
    context.shutdown();

    log::info!("vkcore smoke: done");
    Ok(())
}
