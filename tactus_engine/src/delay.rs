/// Circular buffer delay with a feedback path.
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_delay_samples: usize) -> Self {
        Self { buffer: vec![0.0; max_delay_samples.max(2)], write_pos: 0 }
    }

    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Writes `input` plus `feedback` times the delayed signal and returns
    /// the delayed signal. The delay is clamped to the buffer.
    pub fn process(&mut self, input: &[f32], output: &mut [f32], delay_samples: usize, feedback: f32) {
        let buffer_len = self.buffer.len();
        let delay = delay_samples.clamp(1, buffer_len - 1);

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let read_pos = (self.write_pos + buffer_len - delay) % buffer_len;
            let delayed = self.buffer[read_pos];
            self.buffer[self.write_pos] = x + delayed * feedback;
            *y = delayed;
            self.write_pos = (self.write_pos + 1) % buffer_len;
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_repeats() {
        let mut line = DelayLine::new(16);
        let mut input = [0.0f32; 12];
        input[0] = 1.0;
        let mut output = [0.0f32; 12];
        line.process(&input, &mut output, 4, 0.5);
        assert_eq!(output[4], 1.0);
        assert_eq!(output[8], 0.5);
        assert_eq!(output.iter().filter(|s| **s != 0.0).count(), 2);

        line.clear();
        line.process(&[0.0; 12], &mut output, 4, 0.5);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(line.max_delay(), 15);
    }
}
