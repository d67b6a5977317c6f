/*!
# Saving Posterior Draws to CSV

Enable via the `csv` feature.
*/

use std::fs::File;
use std::path::Path;

use csv::Writer;
use ndarray::Axis;

use crate::error::Result;
use crate::fit::{Fit, LP_NAME};

/**
Saves the draws of a [`Fit`] as a CSV file.

The resulting CSV file will have:
- A header row containing `"chain"`, `"draw"`, `"lp__"` and one column per parameter.
- One row per retained draw, chains in order.

# Examples

```rust
use kinetic_mcmc::io::csv::save_csv;
use kinetic_mcmc::{compile_default, sample, BernoulliData, SamplerSettings};

let sm = compile_default()?;
let settings = SamplerSettings::default().with_chains(2).with_draws(50).set_seed(1);
let fit = sample(&sm, &BernoulliData::reference(), &settings)?;
save_csv(&fit, "/tmp/theta.csv")?;
# Ok::<(), kinetic_mcmc::Error>(())
```
*/
pub fn save_csv<P: AsRef<Path>>(fit: &Fit, path: P) -> Result<()> {
    let mut wtr = Writer::from_writer(File::create(path)?);

    let mut header = vec!["chain".to_string(), "draw".to_string(), LP_NAME.to_string()];
    header.extend(fit.param_names().iter().cloned());
    wtr.write_record(&header)?;

    for (chain_idx, chain) in fit.draws().axis_iter(Axis(0)).enumerate() {
        for (draw_idx, draw) in chain.axis_iter(Axis(0)).enumerate() {
            let mut row = vec![
                chain_idx.to_string(),
                draw_idx.to_string(),
                fit.log_probs()[[chain_idx, draw_idx]].to_string(),
            ];
            row.extend(draw.iter().map(|v| v.to_string()));
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    Ok(())
}
