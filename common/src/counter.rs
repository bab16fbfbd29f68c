use std::{thread, time::Duration};
use tracing::info;

pub const COUNT_COMPLETED: &str = "Counting completed!";

/// Unidad de trabajo de ejemplo: cuenta de 1 a `until`, durmiendo `tick` en
/// cada paso. Es bloqueante; el worker la corre en `spawn_blocking`.
pub fn count(until: u32, tick: Duration) -> String {
    let mut current = 0;
    while current < until {
        if !tick.is_zero() {
            thread::sleep(tick);
        }
        current += 1;
        info!("{}/{}", current, until);
    }
    COUNT_COMPLETED.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn count_termina_con_mensaje_fijo() {
        assert_eq!(count(5, Duration::ZERO), COUNT_COMPLETED);
    }

    #[test]
    fn count_cero_no_duerme() {
        let start = Instant::now();
        assert_eq!(count(0, Duration::from_secs(10)), COUNT_COMPLETED);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn count_duerme_un_tick_por_paso() {
        let start = Instant::now();
        count(3, Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
