//! ISAAC keystream used to obfuscate packet type tags.
//!
//! Both peers seed one generator per direction from a value exchanged during
//! login, so identical seeds yield identical sequences without any further
//! coordination. This hides message kinds from casual inspection only; it is
//! not a cryptographic primitive.

const SIZE: usize = 256;
const GOLDEN_RATIO: u32 = 0x9e37_79b9;

#[derive(Clone)]
pub struct Isaac {
    results: [u32; SIZE],
    memory: [u32; SIZE],
    a: u32,
    b: u32,
    c: u32,
    count: usize,
}

impl Isaac {
    pub fn new(seed: u64) -> Self {
        let mut isaac = Self {
            results: [0; SIZE],
            memory: [0; SIZE],
            a: 0,
            b: 0,
            c: 0,
            count: 0,
        };

        isaac.results[0] = seed as u32;
        isaac.results[1] = (seed >> 32) as u32;
        isaac.init();
        isaac
    }

    /// Next 32-bit output.
    pub fn next_u32(&mut self) -> u32 {
        if self.count == 0 {
            self.generate();
            self.count = SIZE;
        }

        self.count -= 1;
        self.results[self.count]
    }

    fn init(&mut self) {
        let mut s = [GOLDEN_RATIO; 8];
        for _ in 0..4 {
            mix(&mut s);
        }

        for i in (0..SIZE).step_by(8) {
            for (j, word) in s.iter_mut().enumerate() {
                *word = word.wrapping_add(self.results[i + j]);
            }
            mix(&mut s);
            self.memory[i..i + 8].copy_from_slice(&s);
        }

        // Second pass so every seed word affects all of memory.
        for i in (0..SIZE).step_by(8) {
            for (j, word) in s.iter_mut().enumerate() {
                *word = word.wrapping_add(self.memory[i + j]);
            }
            mix(&mut s);
            self.memory[i..i + 8].copy_from_slice(&s);
        }

        self.generate();
        self.count = SIZE;
    }

    fn generate(&mut self) {
        self.c = self.c.wrapping_add(1);
        self.b = self.b.wrapping_add(self.c);

        for i in 0..SIZE {
            let x = self.memory[i];
            self.a ^= match i % 4 {
                0 => self.a << 13,
                1 => self.a >> 6,
                2 => self.a << 2,
                _ => self.a >> 16,
            };
            self.a = self.memory[(i + SIZE / 2) % SIZE].wrapping_add(self.a);

            let y = self.memory[(x >> 2) as usize % SIZE]
                .wrapping_add(self.a)
                .wrapping_add(self.b);
            self.memory[i] = y;

            self.b = self.memory[(y >> 10) as usize % SIZE].wrapping_add(x);
            self.results[i] = self.b;
        }
    }
}

impl std::fmt::Debug for Isaac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isaac").field("count", &self.count).finish()
    }
}

fn mix(s: &mut [u32; 8]) {
    s[0] ^= s[1] << 11;
    s[3] = s[3].wrapping_add(s[0]);
    s[1] = s[1].wrapping_add(s[2]);
    s[1] ^= s[2] >> 2;
    s[4] = s[4].wrapping_add(s[1]);
    s[2] = s[2].wrapping_add(s[3]);
    s[2] ^= s[3] << 8;
    s[5] = s[5].wrapping_add(s[2]);
    s[3] = s[3].wrapping_add(s[4]);
    s[3] ^= s[4] >> 16;
    s[6] = s[6].wrapping_add(s[3]);
    s[4] = s[4].wrapping_add(s[5]);
    s[4] ^= s[5] << 10;
    s[7] = s[7].wrapping_add(s[4]);
    s[5] = s[5].wrapping_add(s[6]);
    s[5] ^= s[6] >> 4;
    s[0] = s[0].wrapping_add(s[5]);
    s[6] = s[6].wrapping_add(s[7]);
    s[6] ^= s[7] << 8;
    s[1] = s[1].wrapping_add(s[6]);
    s[7] = s[7].wrapping_add(s[0]);
    s[7] ^= s[0] >> 9;
    s[2] = s[2].wrapping_add(s[7]);
    s[0] = s[0].wrapping_add(s[1]);
}
